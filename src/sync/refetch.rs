use crate::error::Result;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Runs at most one fetch at a time. Starting a new fetch aborts the one in
/// flight, and any result from an older generation that still slips through
/// is discarded by [`next`](Self::next).
pub struct Refetcher<T> {
    latest: u64,
    inflight: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<(u64, Result<T>)>,
    rx: mpsc::UnboundedReceiver<(u64, Result<T>)>,
}

impl<T: Send + 'static> Default for Refetcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Refetcher<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { latest: 0, inflight: None, tx, rx }
    }

    pub fn generation(&self) -> u64 {
        self.latest
    }

    pub fn is_inflight(&self) -> bool {
        self.inflight.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn start<F>(&mut self, fetch: F) -> u64
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        if let Some(prev) = self.inflight.take() {
            prev.abort();
        }
        self.latest += 1;
        let generation = self.latest;
        let tx = self.tx.clone();
        self.inflight = Some(tokio::spawn(async move {
            let result = fetch.await;
            let _ = tx.send((generation, result));
        }));
        generation
    }

    /// Waits for the result of the most recent fetch. Pends forever when no
    /// fetch was started; cancel-safe, so it can sit in a `select!`.
    pub async fn next(&mut self) -> Result<T> {
        loop {
            let Some((generation, result)) = self.rx.recv().await else {
                return std::future::pending().await;
            };
            if generation == self.latest {
                self.inflight = None;
                return result;
            }
            log::debug!("dropping stale fetch result {} (latest {})", generation, self.latest);
        }
    }
}

impl<T> Drop for Refetcher<T> {
    fn drop(&mut self) {
        if let Some(h) = self.inflight.take() {
            h.abort();
        }
    }
}
