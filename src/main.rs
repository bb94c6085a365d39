use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use coursehub_client::api::client::ApiClient;
use coursehub_client::api::events::{ALL_EVENTS, IncomingEvent, ServerEvent};
use coursehub_client::api::models::{DiffKind, SupportAction};
use coursehub_client::app::{AppState, CacheBackend};
use coursehub_client::cache::{CacheService, MemoryCache};
use coursehub_client::storage::SqliteCache;
use coursehub_client::sync::chat::ChatSession;
use coursehub_client::sync::review::BufferReview;
use coursehub_client::transport::{ConnectivityMonitor, Transport};
use coursehub_client::ui::banner::ErrorBanner;
use coursehub_client::ui::boundary::{ErrorBoundary, Rendered};
use coursehub_client::ui::buffer_list::BufferList;
use coursehub_client::ui::chat_view::ChatView;
use coursehub_client::ui::connectivity_badge;
use coursehub_client::ui::crawl_form::CrawlForm;
use coursehub_client::utils::{self, ws_url_for};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coursehub", version, about = "Terminal front end for a CourseHub server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save server credentials.
    Login {
        #[arg(long)]
        server: String,
        #[arg(long)]
        token: Option<String>,
        /// Your user id on the server.
        #[arg(long)]
        user: String,
    },
    /// Chat with another user. Lines are sent as messages; `/delete <id>`,
    /// `/retry` and `/reconnect` are commands.
    Chat { peer: String },
    /// Watch pending training buffers and commit progress.
    Review,
    /// Queue a crawl of a web page.
    Crawl { url: String },
    Commit { job_id: String },
    Discard { job_id: String },
    Feedback {
        job_id: String,
        #[arg(long)]
        negative: bool,
        #[arg(long)]
        comment: Option<String>,
    },
    /// List support requests, or act on one.
    Support {
        #[arg(long, conflicts_with_all = ["reject", "resolve"])]
        accept: Option<String>,
        #[arg(long, conflicts_with = "resolve")]
        reject: Option<String>,
        #[arg(long)]
        resolve: Option<String>,
    },
    Courses,
    /// Import enrollments from a CSV/XLSX spreadsheet.
    Import { course_id: String, file: PathBuf },
    /// Show the changes between two report versions.
    ReportDiff { report_id: String, from: u32, to: u32 },
}

#[derive(Clone, Copy)]
struct Screen {
    lines: usize,
}

impl Default for Screen {
    fn default() -> Self {
        Self { lines: 20 }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn build_cache(state: &AppState) -> Arc<dyn CacheService> {
    match state.cache {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::Sqlite => match SqliteCache::open_default() {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                log::warn!("falling back to in-memory cache: {}", e);
                Arc::new(MemoryCache::new())
            }
        },
    }
}

fn configured() -> anyhow::Result<AppState> {
    let state = AppState::load();
    if !state.is_configured() {
        bail!("not logged in; run `coursehub login --server <url> --user <id>` first");
    }
    Ok(state)
}

fn decode(event: &IncomingEvent) -> Option<ServerEvent> {
    match ServerEvent::decode(event) {
        Ok(ev) => Some(ev),
        Err(e) => {
            log::debug!("ignoring undecodable {} event: {}", event.event_type, e);
            None
        }
    }
}

fn print_lines(lines: &[String]) {
    println!("----");
    for line in lines {
        println!("{}", line);
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    utils::block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Command::Login { server, token, user } = cli.command {
        return login(server, token, user).await;
    }

    let state = configured()?;
    let api = Arc::new(ApiClient::new(&state.base_url, state.token.clone())?);
    match cli.command {
        Command::Login { .. } => unreachable!("handled above"),
        Command::Chat { peer } => chat(state, api, peer).await,
        Command::Review => review(state, api).await,
        Command::Crawl { url } => {
            let mut form = CrawlForm::new();
            form.set_url(&url);
            if let Some(err) = form.error() {
                bail!(err);
            }
            match form.submit(&*api).await? {
                Some(job) => println!("queued {} ({})", job.job_id, job.status),
                None => bail!("nothing to submit"),
            }
            Ok(())
        }
        Command::Commit { job_id } => {
            let outcome = api.commit_buffer(&job_id).await?;
            match outcome.version_id {
                Some(v) => println!("committed {} into version {}", outcome.job_id, v),
                None => println!("committed {}", outcome.job_id),
            }
            Ok(())
        }
        Command::Discard { job_id } => {
            api.discard_buffer(&job_id).await?;
            println!("discarded {}", job_id);
            Ok(())
        }
        Command::Feedback { job_id, negative, comment } => {
            let feedback = coursehub_client::api::models::Feedback { positive: !negative, comment };
            api.submit_feedback(&job_id, &feedback).await?;
            println!("feedback recorded");
            Ok(())
        }
        Command::Support { accept, reject, resolve } => {
            let action = accept
                .map(|id| (id, SupportAction::Accept))
                .or(reject.map(|id| (id, SupportAction::Reject)))
                .or(resolve.map(|id| (id, SupportAction::Resolve)));
            match action {
                Some((id, action)) => {
                    let req = api.update_support_request(&id, action).await?;
                    println!("{} is now {:?}", req.id, req.status);
                }
                None => {
                    for req in api.support_requests().await? {
                        println!("{}  {:?}  {}  {}", req.id, req.status, req.requester, req.subject);
                    }
                }
            }
            Ok(())
        }
        Command::Courses => {
            for course in api.courses().await? {
                let active = if course.is_active { "active" } else { "inactive" };
                println!("{}  {}  ({})", course.id, course.title, active);
            }
            Ok(())
        }
        Command::Import { course_id, file } => {
            let bytes = tokio::fs::read(&file).await.with_context(|| format!("reading {}", file.display()))?;
            let name = file.file_name().and_then(|n| n.to_str()).unwrap_or("enrollments.csv");
            let summary = api.import_enrollments(&course_id, name, bytes).await?;
            println!("imported {}, skipped {}", summary.imported, summary.skipped);
            for err in summary.errors {
                println!("  {}", err);
            }
            Ok(())
        }
        Command::ReportDiff { report_id, from, to } => {
            let diff = api.report_diff(&report_id, from, to).await?;
            for line in diff.lines {
                let mark = match line.kind {
                    DiffKind::Added => '+',
                    DiffKind::Removed => '-',
                    DiffKind::Unchanged => ' ',
                };
                println!("{}{}", mark, line.text);
            }
            Ok(())
        }
    }
}

async fn login(server: String, token: Option<String>, user: String) -> anyhow::Result<()> {
    let base_url = utils::normalize_url(&server);
    let client = ApiClient::new(&base_url, token.clone())?;
    // Credentials are kept even when the server cannot be reached right now.
    let message = match client.ping().await {
        Ok(()) => "Connected",
        Err(e) => {
            log::info!("ping failed: {}", e);
            "Saved (server unreachable)"
        }
    };
    let mut state = AppState::load();
    state.base_url = base_url;
    state.token = token;
    state.user_id = user;
    state.save().context("saving settings")?;
    println!("{}", message);
    Ok(())
}

struct Live {
    transport: Arc<Transport>,
    events: UnboundedReceiver<IncomingEvent>,
    monitor: ConnectivityMonitor,
}

async fn go_live(state: &AppState) -> anyhow::Result<Live> {
    let transport = Arc::new(Transport::new(ws_url_for(&state.base_url)?, state.token.as_deref()));
    let (_all, events) = transport.bus().forward(ALL_EVENTS);
    transport.connect().await;
    let monitor = ConnectivityMonitor::spawn(transport.status(), state.connectivity_poll());
    println!("{}", connectivity_badge(monitor.is_connected()));
    Ok(Live { transport, events, monitor })
}

async fn chat(state: AppState, api: Arc<ApiClient>, peer: String) -> anyhow::Result<()> {
    let Live { transport, mut events, monitor } = go_live(&state).await?;
    let mut link = monitor.subscribe();
    let mut session = ChatSession::new(api, transport.clone(), state.user_id.clone(), peer);
    let mut banner = ErrorBanner::new();
    let mut screen = ErrorBoundary::new(Screen::default);

    if let Err(e) = session.load_history().await {
        banner.show(&e);
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match screen.render(|s| ChatView::render(&session, s.lines)) {
            Rendered::Ok(mut lines) => {
                lines.extend(banner.render());
                print_lines(&lines);
            }
            Rendered::Crashed(reason) => {
                println!("view crashed ({}); resetting", reason);
                screen.try_again();
            }
        }

        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == "/quit" {
                    break;
                } else if let Some(id) = line.strip_prefix("/delete ") {
                    match session.delete(id.trim()).await {
                        Ok(true) => {}
                        Ok(false) => println!("cannot delete {}", id.trim()),
                        Err(e) => log::info!("delete failed: {}", e),
                    }
                } else if line == "/retry" {
                    banner.dismiss();
                    session.clear_error();
                    if let Err(e) = session.load_history().await {
                        banner.show(&e);
                    }
                } else if line == "/reconnect" {
                    transport.connect().await;
                } else {
                    session.input_changed(line).await;
                    session.send(line).await;
                }
            }
            Some(ev) = events.recv() => {
                if let Some(ev) = decode(&ev) {
                    if !session.handle_event(&ev) {
                        continue;
                    }
                }
            }
            Ok(()) = link.changed() => {
                println!("{}", connectivity_badge(*link.borrow()));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    transport.disconnect().await;
    Ok(())
}

async fn review(state: AppState, api: Arc<ApiClient>) -> anyhow::Result<()> {
    let Live { transport, mut events, monitor } = go_live(&state).await?;
    let mut link = monitor.subscribe();
    let mut review = BufferReview::new(api, build_cache(&state));
    println!("commands: o <job> open, c <job> commit, d <job> discard, + <job> / - <job> feedback, r refresh, q quit");
    print_lines(&BufferList::render(&review));
    review.refresh();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            res = review.next_update() => {
                if let Err(e) = res {
                    log::info!("refresh failed: {}", e);
                }
                print_lines(&BufferList::render(&review));
            }
            Some(ev) = events.recv() => {
                if let Some(ev) = decode(&ev) {
                    review.handle_event(&ev);
                    if matches!(ev, ServerEvent::CrawlLog { .. }) {
                        if let Some(line) = review.crawl_log().last() {
                            println!("  {}", line);
                        }
                    }
                }
            }
            Ok(()) = link.changed() => {
                println!("{}", connectivity_badge(*link.borrow()));
            }
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let mut parts = line.split_whitespace();
                let cmd = parts.next().unwrap_or_default();
                let job = parts.next().unwrap_or_default().to_string();
                let done = match (cmd, job.is_empty()) {
                    ("q", _) => break,
                    ("r", _) => {
                        review.refresh();
                        Ok(())
                    }
                    ("o", false) => review.open_buffer(&job).await.map(|buffer| {
                        println!("{}  {}  [{}]", buffer.metadata.job_id, buffer.metadata.url, buffer.metadata.status);
                        for page in &buffer.pages {
                            println!("  {}  {}", page.url, page.title);
                        }
                    }),
                    ("c", false) => review.commit(&job).await.map(|_| ()),
                    ("d", false) => review.discard(&job).await.map(|_| ()),
                    ("+", false) => review.feedback(&job, true, None).await.map(|_| ()),
                    ("-", false) => review.feedback(&job, false, None).await.map(|_| ()),
                    _ => {
                        println!("unknown command: {}", line.trim());
                        Ok(())
                    }
                };
                if done.is_err() {
                    print_lines(&BufferList::render(&review));
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    transport.disconnect().await;
    Ok(())
}
