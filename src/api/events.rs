use crate::api::models::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Listeners registered under this name receive every event.
pub const ALL_EVENTS: &str = "all";

pub const TRAINING_COMPLETED: &str = "training_completed";
pub const TRAINING_FAILED: &str = "training_failed";
pub const BUFFER_CREATED: &str = "buffer_created";
pub const BUFFER_READY: &str = "buffer_ready";
pub const VERSION_COMMITTED: &str = "version_committed";
pub const VERSION_CREATED: &str = "version_created";
pub const BUFFER_DISCARDED: &str = "buffer_discarded";
pub const COMMIT_PROGRESS: &str = "commit_progress";
pub const PENDING_ROLLOUTS_UPDATED: &str = "pending_rollouts_updated";
pub const CRAWL_LOG: &str = "crawl_log";

pub const MESSAGE_BATCH: &str = "message_batch";
pub const SEND_MESSAGE: &str = "send_message";
pub const TYPING_START: &str = "typing_start";
pub const TYPING_STOP: &str = "typing_stop";
pub const MESSAGE_DELETED: &str = "message_deleted";

/// Events after which pending buffers and commit counters are refetched.
pub const BUFFER_REFRESH_EVENTS: [&str; 9] = [
    TRAINING_COMPLETED,
    TRAINING_FAILED,
    BUFFER_CREATED,
    BUFFER_READY,
    VERSION_COMMITTED,
    VERSION_CREATED,
    BUFFER_DISCARDED,
    COMMIT_PROGRESS,
    PENDING_ROLLOUTS_UPDATED,
];

pub fn triggers_buffer_refresh(event_type: &str) -> bool {
    BUFFER_REFRESH_EVENTS.contains(&event_type)
}

/// Raw frame as it travels over the socket: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomingEvent {
    #[serde(rename = "type", alias = "event", alias = "event_type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl IncomingEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self { event_type: event_type.into(), data }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TypingSignal {
    #[serde(rename = "senderId", alias = "sender_id")]
    pub sender_id: String,
    #[serde(rename = "receiverId", alias = "receiver_id", default)]
    pub receiver_id: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeletedSignal {
    #[serde(rename = "messageId", alias = "message_id", alias = "id")]
    pub message_id: String,
}

/// Decoded view of an [`IncomingEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    MessageBatch(Vec<Message>),
    TypingStarted(TypingSignal),
    TypingStopped(TypingSignal),
    MessageDeleted(DeletedSignal),
    CrawlLog { job_id: Option<String>, line: String },
    /// One of [`BUFFER_REFRESH_EVENTS`]; carries nothing usable for patching.
    BufferSignal(String),
    Other(String),
}

impl ServerEvent {
    pub fn decode(event: &IncomingEvent) -> Result<Self, serde_json::Error> {
        let data = event.data.clone();
        Ok(match event.event_type.as_str() {
            MESSAGE_BATCH => {
                ServerEvent::MessageBatch(crate::api::envelope::parse_list::<Message>(data)?)
            }
            TYPING_START => ServerEvent::TypingStarted(serde_json::from_value(data)?),
            TYPING_STOP => ServerEvent::TypingStopped(serde_json::from_value(data)?),
            MESSAGE_DELETED => ServerEvent::MessageDeleted(serde_json::from_value(data)?),
            CRAWL_LOG => ServerEvent::CrawlLog {
                job_id: data.get("job_id").and_then(Value::as_str).map(str::to_string),
                line: data
                    .get("line")
                    .or_else(|| data.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            t if triggers_buffer_refresh(t) => ServerEvent::BufferSignal(t.to_string()),
            t => ServerEvent::Other(t.to_string()),
        })
    }
}
