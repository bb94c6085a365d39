use crate::api::models::Message;
use crate::sync::pending::PendingSends;
use crate::utils::is_temp_id;
use chrono::{DateTime, Utc};

/// Most recent messages kept per conversation.
pub const MAX_MESSAGES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeleteState {
    #[default]
    Idle,
    Deleting,
    DeleteFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub message: Message,
    pub delete_state: DeleteState,
    /// Body held back while a delete is in flight, restored if it fails.
    saved_body: Option<String>,
}

impl Entry {
    fn new(message: Message) -> Self {
        Self { message, delete_state: DeleteState::Idle, saved_body: None }
    }

    pub fn is_pending(&self) -> bool {
        is_temp_id(&self.message.id)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub reconciled: usize,
    pub inserted: usize,
    pub updated: usize,
}

/// Conversation messages, always ascending by `sent_at`, unique by id and
/// capped at the most recent [`MAX_MESSAGES`].
#[derive(Debug, Clone)]
pub struct MessageList {
    entries: Vec<Entry>,
    cap: usize,
}

impl Default for MessageList {
    fn default() -> Self {
        Self::with_capacity(MAX_MESSAGES)
    }
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { entries: Vec::new(), cap: cap.max(1) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.message.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.message.id == id)
    }

    fn normalize(&mut self) {
        self.entries.sort_by(|a, b| a.message.sent_at.cmp(&b.message.sent_at));
        if self.entries.len() > self.cap {
            let excess = self.entries.len() - self.cap;
            self.entries.drain(..excess);
        }
    }

    fn upsert_raw(&mut self, message: Message) -> bool {
        match self.position(&message.id) {
            Some(i) => {
                let entry = &mut self.entries[i];
                // A local delete in flight owns the body until it settles.
                if entry.delete_state == DeleteState::Deleting && !message.is_deleted {
                    entry.saved_body = Some(message.message.clone());
                    entry.message = Message { message: String::new(), is_deleted: true, ..message };
                } else {
                    entry.message = message;
                }
                false
            }
            None => {
                self.entries.push(Entry::new(message));
                true
            }
        }
    }

    /// Inserts or overwrites by id. Returns true when the id was new.
    pub fn upsert(&mut self, message: Message) -> bool {
        let inserted = self.upsert_raw(message);
        self.normalize();
        inserted
    }

    /// Swaps a temporary entry for its canonical server copy.
    pub fn replace(&mut self, temp_id: &str, canonical: Message) {
        if let Some(i) = self.position(temp_id) {
            self.entries.remove(i);
        }
        self.upsert(canonical);
    }

    /// Replaces server-owned entries with a fresh history page while keeping
    /// optimistic entries that are still waiting for their echo. Own history
    /// messages that confirm a pending send replace its temporary entry.
    pub fn reset(
        &mut self,
        history: Vec<Message>,
        current_user: &str,
        pending: &mut PendingSends,
        now: DateTime<Utc>,
    ) -> MergeReport {
        self.entries.retain(Entry::is_pending);
        self.merge_batch(history, current_user, pending, now)
    }

    /// Removes the temporary entry `message` confirms, if any. Only own
    /// messages not yet in the list are considered.
    fn confirm_pending(
        &mut self,
        message: &Message,
        current_user: &str,
        pending: &mut PendingSends,
        now: DateTime<Utc>,
    ) -> bool {
        if message.sender_id != current_user || self.contains(&message.id) {
            return false;
        }
        let temp_id = match message.client_temp_id.as_deref() {
            Some(t) if pending.remove(t).is_some() || self.contains(t) => Some(t.to_string()),
            _ => pending.take_match(&message.receiver_id, &message.message, now),
        };
        let Some(temp_id) = temp_id else {
            return false;
        };
        if let Some(i) = self.position(&temp_id) {
            self.entries.remove(i);
        }
        true
    }

    /// Merges a batch pushed by the server. Own messages are first matched to
    /// the temporary entry they confirm: by echoed temp id when the server
    /// provides one, else by `(receiver_id, text)` within the pending window.
    pub fn merge_batch(
        &mut self,
        batch: Vec<Message>,
        current_user: &str,
        pending: &mut PendingSends,
        now: DateTime<Utc>,
    ) -> MergeReport {
        let mut report = MergeReport::default();
        for message in batch {
            if self.confirm_pending(&message, current_user, pending, now) {
                self.upsert_raw(message);
                report.reconciled += 1;
            } else if self.upsert_raw(message) {
                report.inserted += 1;
            } else {
                report.updated += 1;
            }
        }
        self.normalize();
        report
    }

    /// Optimistically hides a message while its delete request runs.
    /// Refuses temporary ids, already-deleted messages and repeat requests.
    pub fn begin_delete(&mut self, id: &str) -> bool {
        if is_temp_id(id) {
            return false;
        }
        let Some(i) = self.position(id) else {
            return false;
        };
        let entry = &mut self.entries[i];
        if entry.delete_state == DeleteState::Deleting || entry.message.is_deleted {
            return false;
        }
        entry.saved_body = Some(std::mem::take(&mut entry.message.message));
        entry.message.is_deleted = true;
        entry.delete_state = DeleteState::Deleting;
        true
    }

    pub fn finish_delete(&mut self, id: &str) {
        if let Some(i) = self.position(id) {
            let entry = &mut self.entries[i];
            entry.saved_body = None;
            entry.delete_state = DeleteState::Idle;
        }
    }

    /// Rolls back [`begin_delete`](Self::begin_delete) and records the reason.
    pub fn fail_delete(&mut self, id: &str, reason: String) {
        if let Some(i) = self.position(id) {
            let entry = &mut self.entries[i];
            if let Some(body) = entry.saved_body.take() {
                entry.message.message = body;
            }
            entry.message.is_deleted = false;
            entry.delete_state = DeleteState::DeleteFailed(reason);
        }
    }

    /// Applies a deletion announced by another client.
    pub fn mark_deleted(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(i) => {
                let entry = &mut self.entries[i];
                entry.message.message.clear();
                entry.message.is_deleted = true;
                entry.saved_body = None;
                entry.delete_state = DeleteState::Idle;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn msg(id: &str, from: &str, to: &str, text: &str, secs: i64) -> Message {
        Message {
            id: id.into(),
            sender_id: from.into(),
            receiver_id: to.into(),
            message: text.into(),
            sent_at: at(secs),
            is_deleted: false,
            client_temp_id: None,
        }
    }

    #[test]
    fn out_of_order_batches_end_sorted() {
        let mut list = MessageList::new();
        let mut pending = PendingSends::new();
        list.merge_batch(vec![msg("3", "b", "a", "c", 30), msg("1", "b", "a", "a", 10)], "a", &mut pending, at(40));
        list.merge_batch(vec![msg("2", "b", "a", "b", 20)], "a", &mut pending, at(40));
        let ids: Vec<_> = list.messages().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn overwrites_by_id() {
        let mut list = MessageList::new();
        let mut pending = PendingSends::new();
        list.merge_batch(vec![msg("1", "b", "a", "first", 10)], "a", &mut pending, at(10));
        let report = list.merge_batch(vec![msg("1", "b", "a", "edited", 10)], "a", &mut pending, at(10));
        assert_eq!(report, MergeReport { reconciled: 0, inserted: 0, updated: 1 });
        assert_eq!(list.len(), 1);
        assert_eq!(list.get("1").unwrap().message.message, "edited");
    }

    #[test]
    fn echo_with_temp_id_replaces_directly() {
        let mut list = MessageList::new();
        let mut pending = PendingSends::new();
        list.upsert(msg("temp-x", "a", "b", "hi", 0));
        let mut echo = msg("99", "a", "b", "hi", 1);
        echo.client_temp_id = Some("temp-x".into());
        let report = list.merge_batch(vec![echo], "a", &mut pending, at(60));
        assert_eq!(report.reconciled, 1);
        assert_eq!(list.len(), 1);
        assert!(list.contains("99"));
    }

    #[test]
    fn keeps_most_recent_when_over_capacity() {
        let mut list = MessageList::with_capacity(3);
        let mut pending = PendingSends::new();
        let batch = (0..5).map(|i| msg(&i.to_string(), "b", "a", "x", i)).collect();
        list.merge_batch(batch, "a", &mut pending, at(10));
        let ids: Vec<_> = list.messages().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["2", "3", "4"]);
    }

    #[test]
    fn delete_rolls_back_on_failure() {
        let mut list = MessageList::new();
        list.upsert(msg("1", "a", "b", "secret", 0));
        assert!(list.begin_delete("1"));
        assert!(!list.begin_delete("1"));
        assert_eq!(list.get("1").unwrap().message.message, "");
        list.fail_delete("1", "offline".into());
        let entry = list.get("1").unwrap();
        assert_eq!(entry.message.message, "secret");
        assert!(!entry.message.is_deleted);
        assert_eq!(entry.delete_state, DeleteState::DeleteFailed("offline".into()));

        assert!(list.begin_delete("1"));
        list.finish_delete("1");
        let entry = list.get("1").unwrap();
        assert!(entry.message.is_deleted);
        assert_eq!(entry.delete_state, DeleteState::Idle);
    }

    #[test]
    fn server_update_during_delete_does_not_resurrect_body() {
        let mut list = MessageList::new();
        list.upsert(msg("1", "a", "b", "v1", 0));
        list.begin_delete("1");
        list.upsert(msg("1", "a", "b", "v2", 0));
        assert_eq!(list.get("1").unwrap().message.message, "");
        list.fail_delete("1", "500".into());
        assert_eq!(list.get("1").unwrap().message.message, "v2");
    }

    #[test]
    fn reset_keeps_unconfirmed_sends() {
        let mut list = MessageList::new();
        list.upsert(msg("temp-1", "a", "b", "pending", 5));
        list.upsert(msg("old", "b", "a", "gone", 1));
        let mut pending = PendingSends::new();
        list.reset(vec![msg("10", "b", "a", "fresh", 2)], "a", &mut pending, at(6));
        let ids: Vec<_> = list.messages().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["10", "temp-1"]);
    }

    #[test]
    fn history_confirming_a_pending_send_is_not_duplicated_by_its_echo() {
        use crate::sync::pending::PendingSendRecord;

        let mut list = MessageList::new();
        let mut pending = PendingSends::new();
        list.upsert(msg("temp-abc", "a", "b", "hello", 0));
        pending.register(
            "temp-abc".into(),
            PendingSendRecord { created_at: at(0), message: "hello".into(), receiver_id: "b".into() },
        );

        let report = list.reset(vec![msg("77", "a", "b", "hello", 0)], "a", &mut pending, at(1));
        assert_eq!(report.reconciled, 1);
        assert!(pending.is_empty());

        list.merge_batch(vec![msg("77", "a", "b", "hello", 0)], "a", &mut pending, at(1));
        let ids: Vec<_> = list.messages().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["77"]);
    }

    #[test]
    fn temp_entries_cannot_be_deleted() {
        let mut list = MessageList::new();
        list.upsert(msg("temp-1", "a", "b", "x", 0));
        assert!(!list.begin_delete("temp-1"));
        assert!(!list.begin_delete("missing"));
    }
}
