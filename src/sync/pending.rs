use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Seconds a locally sent message waits for its server echo.
pub const RECONCILE_WINDOW_SECS: i64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingSendRecord {
    pub created_at: DateTime<Utc>,
    pub message: String,
    pub receiver_id: String,
}

/// Messages sent from this client that the server has not echoed yet,
/// keyed by temporary id.
#[derive(Debug, Default)]
pub struct PendingSends {
    records: HashMap<String, PendingSendRecord>,
    window: Option<Duration>,
}

impl PendingSends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: Duration) -> Self {
        Self { records: HashMap::new(), window: Some(window) }
    }

    fn window(&self) -> Duration {
        self.window.unwrap_or_else(|| Duration::seconds(RECONCILE_WINDOW_SECS))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, temp_id: &str) -> bool {
        self.records.contains_key(temp_id)
    }

    /// Registering an id twice replaces the earlier record.
    pub fn register(&mut self, temp_id: String, record: PendingSendRecord) {
        self.records.insert(temp_id, record);
    }

    pub fn remove(&mut self, temp_id: &str) -> Option<PendingSendRecord> {
        self.records.remove(temp_id)
    }

    /// Finds and removes the oldest record for `(receiver_id, message)` created
    /// within the window before `now`. Identical texts sent in quick
    /// succession are matched oldest-first.
    pub fn take_match(&mut self, receiver_id: &str, message: &str, now: DateTime<Utc>) -> Option<String> {
        let window = self.window();
        let temp_id = self
            .records
            .iter()
            .filter(|(_, r)| r.receiver_id == receiver_id && r.message == message && now - r.created_at <= window)
            .min_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then_with(|| a.0.cmp(b.0)))
            .map(|(id, _)| id.clone())?;
        self.records.remove(&temp_id);
        Some(temp_id)
    }

    /// Drops records older than the window; returns their temp ids.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let window = self.window();
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| now - r.created_at > window)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.records.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(at: DateTime<Utc>, text: &str) -> PendingSendRecord {
        PendingSendRecord { created_at: at, message: text.into(), receiver_id: "bob".into() }
    }

    #[test]
    fn matches_within_window_only() {
        let t0 = Utc::now();
        let mut pending = PendingSends::new();
        pending.register("temp-1".into(), record(t0, "hello"));

        assert_eq!(pending.take_match("bob", "hello", t0 + Duration::seconds(8)), None);
        assert_eq!(pending.take_match("alice", "hello", t0), None);
        assert_eq!(pending.take_match("bob", "hello", t0 + Duration::seconds(7)), Some("temp-1".into()));
        assert!(pending.is_empty());
    }

    #[test]
    fn identical_texts_match_oldest_first() {
        let t0 = Utc::now();
        let mut pending = PendingSends::new();
        pending.register("temp-b".into(), record(t0 + Duration::seconds(1), "ok"));
        pending.register("temp-a".into(), record(t0, "ok"));
        let now = t0 + Duration::seconds(2);
        assert_eq!(pending.take_match("bob", "ok", now).as_deref(), Some("temp-a"));
        assert_eq!(pending.take_match("bob", "ok", now).as_deref(), Some("temp-b"));
    }

    #[test]
    fn purge_drops_stale_records() {
        let t0 = Utc::now();
        let mut pending = PendingSends::new();
        pending.register("old".into(), record(t0, "a"));
        pending.register("new".into(), record(t0 + Duration::seconds(5), "b"));
        let purged = pending.purge_expired(t0 + Duration::seconds(10));
        assert_eq!(purged, vec!["old".to_string()]);
        assert!(pending.contains("new"));
    }
}
