use crate::sync::chat::{ChatBackend, ChatSession, ChatSink};
use crate::sync::messages::{DeleteState, Entry};

pub const DELETED_TEXT: &str = "This message was deleted";

pub struct ChatView;

impl ChatView {
    pub fn line(entry: &Entry, user_id: &str) -> String {
        let m = &entry.message;
        let who = if m.sender_id == user_id { "me" } else { m.sender_id.as_str() };
        let time = m.sent_at.format("%H:%M");
        let body = if m.is_deleted { DELETED_TEXT } else { m.message.as_str() };
        let mut line = format!("[{}] {}: {}", time, who, body);
        if entry.is_pending() {
            line.push_str("  (sending…)");
        }
        match &entry.delete_state {
            DeleteState::Idle => {}
            DeleteState::Deleting => line.push_str("  (deleting…)"),
            DeleteState::DeleteFailed(reason) => {
                line.push_str(&format!("  (delete failed: {})", reason));
            }
        }
        if !entry.is_pending() && m.sender_id == user_id && !m.is_deleted {
            line.push_str(&format!("  #{}", m.id));
        }
        line
    }

    /// Renders the last `limit` messages plus typing and error lines.
    pub fn render<B: ChatBackend, S: ChatSink>(session: &ChatSession<B, S>, limit: usize) -> Vec<String> {
        let entries = session.messages().entries();
        let skip = entries.len().saturating_sub(limit);
        let mut lines: Vec<String> =
            entries[skip..].iter().map(|e| Self::line(e, session.user_id())).collect();
        if session.peer_typing() {
            lines.push(format!("{} is typing…", session.peer_id()));
        }
        if let Some(err) = session.error() {
            lines.push(format!("! {}", err));
        }
        lines
    }
}
