//! Push channel client.
//!
//! A single WebSocket carries JSON frames of the form `{"type": ..., "data": ...}`.
//! Listeners subscribe per event type (or to [`ALL_EVENTS`]). Connection
//! problems never reach callers: they are logged, the link is marked down,
//! and front ends learn about it by polling [`LinkStatus`].

use crate::api::events::{ALL_EVENTS, IncomingEvent};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

pub type Handler = Arc<dyn Fn(&IncomingEvent) + Send + Sync>;

/// Returned by [`EventBus::on`]; pass it back to [`EventBus::off`] to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    event: String,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: HashMap<String, Vec<(u64, Handler)>>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&IncomingEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.next_id += 1;
        let id = inner.next_id;
        inner.handlers.entry(event.to_string()).or_default().push((id, Arc::new(handler)));
        Subscription { event: event.to_string(), id }
    }

    /// Returns false when the subscription was already removed.
    pub fn off(&self, event: &str, subscription: &Subscription) -> bool {
        if event != subscription.event {
            return false;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let Some(list) = inner.handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        let removed = list.len() != before;
        if list.is_empty() {
            inner.handlers.remove(event);
        }
        removed
    }

    /// Queues matching events onto a channel, for owners that process them
    /// from their own task.
    pub fn forward(&self, event: &str) -> (Subscription, mpsc::UnboundedReceiver<IncomingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = self.on(event, move |ev| {
            let _ = tx.send(ev.clone());
        });
        (sub, rx)
    }

    pub fn listener_count(&self, event: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.handlers.get(event).map_or(0, Vec::len)
    }

    /// Calls the handlers for `event.event_type`, then the `"all"` handlers.
    /// Handlers run outside the lock so they may subscribe or unsubscribe.
    pub fn dispatch(&self, event: &IncomingEvent) -> usize {
        let targets: Vec<Handler> = {
            let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let typed = inner.handlers.get(&event.event_type).into_iter().flatten();
            let all = if event.event_type == ALL_EVENTS {
                None
            } else {
                inner.handlers.get(ALL_EVENTS)
            };
            typed.chain(all.into_iter().flatten()).map(|(_, h)| h.clone()).collect()
        };
        for handler in &targets {
            handler(event);
        }
        targets.len()
    }
}

/// Shared up/down flag for the link.
#[derive(Clone, Default)]
pub struct LinkStatus(Arc<AtomicBool>);

impl LinkStatus {
    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, up: bool) {
        self.0.store(up, Ordering::Release);
    }
}

struct Link {
    outgoing: mpsc::UnboundedSender<WsMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Link {
    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

pub struct Transport {
    url: Url,
    bus: EventBus,
    status: LinkStatus,
    link: tokio::sync::Mutex<Option<Link>>,
}

impl Transport {
    pub fn new(mut url: Url, token: Option<&str>) -> Self {
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Self { url, bus: EventBus::new(), status: LinkStatus::default(), link: tokio::sync::Mutex::new(None) }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn status(&self) -> LinkStatus {
        self.status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&IncomingEvent) + Send + Sync + 'static,
    {
        self.bus.on(event, handler)
    }

    pub fn off(&self, event: &str, subscription: &Subscription) -> bool {
        self.bus.off(event, subscription)
    }

    /// Opens the socket unless it is already up. Failures are logged only.
    pub async fn connect(&self) {
        let mut link = self.link.lock().await;
        if link.is_some() && self.status.is_connected() {
            return;
        }
        if let Some(stale) = link.take() {
            stale.abort();
        }

        let (ws, _) = match connect_async(self.url.as_str()).await {
            Ok(ok) => ok,
            Err(e) => {
                log::warn!("push channel connect to {} failed: {}", self.url.host_str().unwrap_or("?"), e);
                self.status.set(false);
                return;
            }
        };
        log::info!("push channel connected");
        self.status.set(true);

        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

        let writer_status = self.status.clone();
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = sink.send(msg).await {
                    log::warn!("push channel write failed: {}", e);
                    writer_status.set(false);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader_status = self.status.clone();
        let bus = self.bus.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<IncomingEvent>(&text) {
                        Ok(event) => {
                            log::debug!("push event {}", event.event_type);
                            bus.dispatch(&event);
                        }
                        Err(e) => log::debug!("dropping malformed frame: {}", e),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("push channel read failed: {}", e);
                        break;
                    }
                }
            }
            reader_status.set(false);
            log::info!("push channel closed");
        });

        *link = Some(Link { outgoing: tx, reader, writer });
    }

    /// Emits `{"type": event, "data": data}`. Returns false (and drops the
    /// frame) while disconnected.
    pub async fn send(&self, event: &str, data: serde_json::Value) -> bool {
        if !self.status.is_connected() {
            log::debug!("not connected, dropping {}", event);
            return false;
        }
        let frame = IncomingEvent::new(event, data);
        let text = match serde_json::to_string(&frame) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("could not encode {}: {}", event, e);
                return false;
            }
        };
        let link = self.link.lock().await;
        match link.as_ref() {
            Some(link) => link.outgoing.send(WsMessage::Text(text)).is_ok(),
            None => false,
        }
    }

    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        if let Some(link) = link.take() {
            let _ = link.outgoing.send(WsMessage::Close(None));
            // Give the writer a moment to flush the close frame.
            let _ = tokio::time::timeout(Duration::from_millis(250), link.writer).await;
            link.reader.abort();
        }
        self.status.set(false);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Ok(mut link) = self.link.try_lock() {
            if let Some(link) = link.take() {
                link.abort();
            }
        }
    }
}

/// Polls a [`LinkStatus`] on a fixed interval and publishes changes, for
/// front ends that show a connectivity badge. The task stops on drop.
pub struct ConnectivityMonitor {
    rx: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    pub fn spawn(status: LinkStatus, every: Duration) -> Self {
        let (tx, rx) = watch::channel(status.is_connected());
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let up = status.is_connected();
                tx.send_if_modified(|current| {
                    let changed = *current != up;
                    *current = up;
                    changed
                });
                if tx.is_closed() {
                    break;
                }
            }
        });
        Self { rx, task }
    }

    pub fn is_connected(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
