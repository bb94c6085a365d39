use crate::api::client::ApiClient;
use crate::api::events::ServerEvent;
use crate::api::models::{
    BufferData, BufferMetadata, CommitOutcome, CrawlJob, Feedback, PendingCommitsStatus,
};
use crate::cache::{CacheExt, CacheService, PENDING_BUFFERS_KEY, PENDING_COMMITS_KEY};
use crate::error::Result;
use crate::sync::refetch::Refetcher;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

const CRAWL_LOG_LINES: usize = 200;

#[async_trait]
pub trait ReviewBackend: Send + Sync + 'static {
    async fn pending_buffers(&self) -> Result<Vec<BufferMetadata>>;
    async fn pending_commits(&self) -> Result<PendingCommitsStatus>;
    async fn buffer(&self, job_id: &str) -> Result<BufferData>;
    async fn commit_buffer(&self, job_id: &str) -> Result<CommitOutcome>;
    async fn discard_buffer(&self, job_id: &str) -> Result<()>;
    async fn submit_feedback(&self, job_id: &str, feedback: &Feedback) -> Result<()>;
    async fn submit_crawl(&self, url: &str) -> Result<CrawlJob>;
}

#[async_trait]
impl ReviewBackend for ApiClient {
    async fn pending_buffers(&self) -> Result<Vec<BufferMetadata>> {
        ApiClient::pending_buffers(self).await
    }

    async fn pending_commits(&self) -> Result<PendingCommitsStatus> {
        ApiClient::pending_commits(self).await
    }

    async fn buffer(&self, job_id: &str) -> Result<BufferData> {
        ApiClient::buffer(self, job_id).await
    }

    async fn commit_buffer(&self, job_id: &str) -> Result<CommitOutcome> {
        ApiClient::commit_buffer(self, job_id).await
    }

    async fn discard_buffer(&self, job_id: &str) -> Result<()> {
        ApiClient::discard_buffer(self, job_id).await
    }

    async fn submit_feedback(&self, job_id: &str, feedback: &Feedback) -> Result<()> {
        ApiClient::submit_feedback(self, job_id, feedback).await
    }

    async fn submit_crawl(&self, url: &str) -> Result<CrawlJob> {
        ApiClient::submit_crawl(self, url).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSnapshot {
    pub buffers: Vec<BufferMetadata>,
    pub commits: PendingCommitsStatus,
}

async fn fetch_snapshot<B: ReviewBackend>(backend: Arc<B>) -> Result<ReviewSnapshot> {
    let (buffers, commits) = tokio::join!(backend.pending_buffers(), backend.pending_commits());
    Ok(ReviewSnapshot { buffers: buffers?, commits: commits? })
}

/// State behind the training buffer review page. None of the push events
/// carry enough to patch the list, so every relevant one triggers a full
/// refetch of pending buffers and commit counters.
pub struct BufferReview<B: ReviewBackend> {
    backend: Arc<B>,
    cache: Arc<dyn CacheService>,
    refetch: Refetcher<ReviewSnapshot>,
    buffers: Vec<BufferMetadata>,
    commits: Option<PendingCommitsStatus>,
    busy: HashSet<String>,
    crawl_log: VecDeque<String>,
    error: Option<String>,
}

impl<B: ReviewBackend> BufferReview<B> {
    /// Starts from whatever the cache holds; call [`refresh`](Self::refresh)
    /// to load fresh data.
    pub fn new(backend: Arc<B>, cache: Arc<dyn CacheService>) -> Self {
        let buffers = cache.get(PENDING_BUFFERS_KEY).unwrap_or_default();
        let commits = cache.get(PENDING_COMMITS_KEY);
        Self {
            backend,
            cache,
            refetch: Refetcher::new(),
            buffers,
            commits,
            busy: HashSet::new(),
            crawl_log: VecDeque::new(),
            error: None,
        }
    }

    pub fn buffers(&self) -> &[BufferMetadata] {
        &self.buffers
    }

    pub fn commits(&self) -> Option<PendingCommitsStatus> {
        self.commits
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn crawl_log(&self) -> impl Iterator<Item = &str> {
        self.crawl_log.iter().map(String::as_str)
    }

    pub fn is_busy(&self, job_id: &str) -> bool {
        self.busy.contains(job_id)
    }

    pub fn is_loading(&self) -> bool {
        self.refetch.is_inflight()
    }

    /// Starts a refetch, superseding any still running.
    pub fn refresh(&mut self) {
        let backend = self.backend.clone();
        self.refetch.start(fetch_snapshot(backend));
    }

    /// Waits for the latest refetch and applies it. Cancel-safe.
    pub async fn next_update(&mut self) -> Result<()> {
        let result = self.refetch.next().await;
        self.apply(result)
    }

    pub async fn refresh_now(&mut self) -> Result<()> {
        self.refresh();
        self.next_update().await
    }

    fn apply(&mut self, result: Result<ReviewSnapshot>) -> Result<()> {
        match result {
            Ok(snapshot) => {
                self.cache.set(PENDING_BUFFERS_KEY, &snapshot.buffers);
                self.cache.set(PENDING_COMMITS_KEY, &snapshot.commits);
                self.buffers = snapshot.buffers;
                self.commits = Some(snapshot.commits);
                self.error = None;
                Ok(())
            }
            Err(e) => {
                log::warn!("buffer refresh failed: {}", e);
                self.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Returns true when the event started a refetch.
    pub fn handle_event(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::BufferSignal(name) => {
                log::debug!("{} received, refreshing buffers", name);
                self.cache.invalidate(PENDING_BUFFERS_KEY);
                self.cache.invalidate(PENDING_COMMITS_KEY);
                self.refresh();
                true
            }
            ServerEvent::CrawlLog { job_id, line } => {
                let line = match job_id {
                    Some(id) => format!("[{}] {}", id, line),
                    None => line.clone(),
                };
                if self.crawl_log.len() == CRAWL_LOG_LINES {
                    self.crawl_log.pop_front();
                }
                self.crawl_log.push_back(line);
                false
            }
            _ => false,
        }
    }

    pub async fn open_buffer(&mut self, job_id: &str) -> Result<BufferData> {
        self.backend.buffer(job_id).await.inspect_err(|e| {
            self.error = Some(e.user_message());
        })
    }

    // Per-buffer actions: one in flight per job id; a second request for the
    // same buffer returns Ok(None) without touching the server.

    pub async fn commit(&mut self, job_id: &str) -> Result<Option<CommitOutcome>> {
        if !self.busy.insert(job_id.to_string()) {
            return Ok(None);
        }
        let result = self.backend.commit_buffer(job_id).await;
        self.busy.remove(job_id);
        self.settle(result).map(Some)
    }

    pub async fn discard(&mut self, job_id: &str) -> Result<Option<()>> {
        if !self.busy.insert(job_id.to_string()) {
            return Ok(None);
        }
        let result = self.backend.discard_buffer(job_id).await;
        self.busy.remove(job_id);
        self.settle(result).map(Some)
    }

    pub async fn feedback(&mut self, job_id: &str, positive: bool, comment: Option<String>) -> Result<Option<()>> {
        if !self.busy.insert(job_id.to_string()) {
            return Ok(None);
        }
        let feedback = Feedback { positive, comment };
        let result = self.backend.submit_feedback(job_id, &feedback).await;
        self.busy.remove(job_id);
        self.settle(result).map(Some)
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(v) => {
                self.error = None;
                self.refresh();
                Ok(v)
            }
            Err(e) => {
                self.error = Some(e.user_message());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBackend {
        buffers: Mutex<Vec<BufferMetadata>>,
        fail: Mutex<bool>,
    }

    fn meta(id: &str) -> BufferMetadata {
        BufferMetadata { job_id: id.into(), url: String::new(), status: "ready".into(), page_count: 1, created_at: None }
    }

    #[async_trait]
    impl ReviewBackend for FakeBackend {
        async fn pending_buffers(&self) -> Result<Vec<BufferMetadata>> {
            if *self.fail.lock().unwrap() {
                return Err(Error::Status { status: 503, body: String::new() });
            }
            Ok(self.buffers.lock().unwrap().clone())
        }
        async fn pending_commits(&self) -> Result<PendingCommitsStatus> {
            let n = self.buffers.lock().unwrap().len() as u32;
            Ok(PendingCommitsStatus { pending_count: n, threshold: 5, ready_for_version: n >= 5 })
        }
        async fn buffer(&self, job_id: &str) -> Result<BufferData> {
            if !self.buffers.lock().unwrap().iter().any(|b| b.job_id == job_id) {
                return Err(Error::Status { status: 404, body: String::new() });
            }
            Ok(BufferData { metadata: meta(job_id), pages: Vec::new() })
        }
        async fn commit_buffer(&self, job_id: &str) -> Result<CommitOutcome> {
            self.buffers.lock().unwrap().retain(|b| b.job_id != job_id);
            Ok(CommitOutcome { job_id: job_id.into(), version_id: None })
        }
        async fn discard_buffer(&self, job_id: &str) -> Result<()> {
            self.buffers.lock().unwrap().retain(|b| b.job_id != job_id);
            Ok(())
        }
        async fn submit_feedback(&self, _job_id: &str, _feedback: &Feedback) -> Result<()> {
            Ok(())
        }
        async fn submit_crawl(&self, url: &str) -> Result<CrawlJob> {
            Ok(CrawlJob { job_id: url.into(), status: "queued".into() })
        }
    }

    #[tokio::test]
    async fn refresh_populates_and_caches() {
        let backend = Arc::new(FakeBackend::default());
        backend.buffers.lock().unwrap().extend([meta("a"), meta("b")]);
        let cache: Arc<dyn CacheService> = Arc::new(MemoryCache::new());
        let mut review = BufferReview::new(backend, cache.clone());
        assert!(review.buffers().is_empty());

        review.refresh_now().await.unwrap();
        assert_eq!(review.buffers().len(), 2);
        assert_eq!(review.commits().unwrap().pending_count, 2);
        assert_eq!(cache.get::<Vec<BufferMetadata>>(PENDING_BUFFERS_KEY).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn starts_from_cache() {
        let cache: Arc<dyn CacheService> = Arc::new(MemoryCache::new());
        cache.set(PENDING_BUFFERS_KEY, &vec![meta("cached")]);
        let review = BufferReview::new(Arc::new(FakeBackend::default()), cache);
        assert_eq!(review.buffers()[0].job_id, "cached");
    }

    #[tokio::test]
    async fn discarded_event_refetches_list() {
        let backend = Arc::new(FakeBackend::default());
        backend.buffers.lock().unwrap().extend([meta("a"), meta("b")]);
        let cache: Arc<dyn CacheService> = Arc::new(MemoryCache::new());
        let mut review = BufferReview::new(backend.clone(), cache.clone());
        review.refresh_now().await.unwrap();

        // Another reviewer discards "a"; only the push event tells us.
        backend.buffers.lock().unwrap().retain(|b| b.job_id != "a");
        assert!(review.handle_event(&ServerEvent::BufferSignal("buffer_discarded".into())));
        assert!(cache.get_raw(PENDING_BUFFERS_KEY).is_none());
        review.next_update().await.unwrap();
        let ids: Vec<_> = review.buffers().iter().map(|b| b.job_id.as_str()).collect();
        assert_eq!(ids, ["b"]);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_old_data_and_reports() {
        let backend = Arc::new(FakeBackend::default());
        backend.buffers.lock().unwrap().push(meta("a"));
        let mut review = BufferReview::new(backend.clone(), Arc::new(MemoryCache::new()));
        review.refresh_now().await.unwrap();

        *backend.fail.lock().unwrap() = true;
        assert!(review.refresh_now().await.is_err());
        assert_eq!(review.buffers().len(), 1);
        assert_eq!(review.error(), Some("Request failed (HTTP 503)."));
    }

    #[tokio::test]
    async fn crawl_log_is_bounded_and_does_not_refetch() {
        let mut review = BufferReview::new(Arc::new(FakeBackend::default()), Arc::new(MemoryCache::new()));
        for i in 0..(CRAWL_LOG_LINES + 5) {
            let ev = ServerEvent::CrawlLog { job_id: Some("j".into()), line: format!("line {i}") };
            assert!(!review.handle_event(&ev));
        }
        assert_eq!(review.crawl_log().count(), CRAWL_LOG_LINES);
        assert_eq!(review.crawl_log().next(), Some("[j] line 5"));
        assert!(!review.is_loading());
    }

    #[tokio::test]
    async fn commit_refreshes_afterwards() {
        let backend = Arc::new(FakeBackend::default());
        backend.buffers.lock().unwrap().extend([meta("a"), meta("b")]);
        let mut review = BufferReview::new(backend, Arc::new(MemoryCache::new()));
        review.refresh_now().await.unwrap();

        let outcome = review.commit("a").await.unwrap().unwrap();
        assert_eq!(outcome.job_id, "a");
        assert!(!review.is_busy("a"));
        review.next_update().await.unwrap();
        assert_eq!(review.buffers().len(), 1);
    }

    #[tokio::test]
    async fn opening_a_vanished_buffer_reports_it() {
        let backend = Arc::new(FakeBackend::default());
        backend.buffers.lock().unwrap().push(meta("a"));
        let mut review = BufferReview::new(backend, Arc::new(MemoryCache::new()));

        assert_eq!(review.open_buffer("a").await.unwrap().metadata.job_id, "a");
        assert!(review.error().is_none());
        assert!(review.open_buffer("gone").await.is_err());
        assert_eq!(review.error(), Some("The requested item no longer exists."));
    }
}
