use crate::api::client::ApiClient;
use crate::api::events::{MESSAGE_DELETED, SEND_MESSAGE, ServerEvent, TYPING_START, TYPING_STOP};
use crate::api::models::Message;
use crate::error::Result;
use crate::sync::messages::{MergeReport, MessageList};
use crate::sync::pending::{PendingSendRecord, PendingSends};
use crate::transport::Transport;
use crate::utils::{new_temp_id, now};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn conversation_messages(&self, peer_id: &str) -> Result<Vec<Message>>;
    async fn delete_message(&self, message_id: &str) -> Result<()>;
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn conversation_messages(&self, peer_id: &str) -> Result<Vec<Message>> {
        ApiClient::conversation_messages(self, peer_id).await
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        ApiClient::delete_message(self, message_id).await
    }
}

/// Outbound half of the push channel as seen by a chat session.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Returns false when the frame could not be handed to the link.
    async fn emit(&self, event: &str, data: Value) -> bool;
}

#[async_trait]
impl ChatSink for Transport {
    async fn emit(&self, event: &str, data: Value) -> bool {
        self.send(event, data).await
    }
}

/// Tracks composer emptiness so typing signals fire only on transitions.
#[derive(Debug, Default)]
pub struct TypingEdge {
    typing: bool,
}

impl TypingEdge {
    /// Returns the signal to emit for the new composer contents, if any.
    pub fn update(&mut self, input: &str) -> Option<&'static str> {
        let typing = !input.is_empty();
        if typing == self.typing {
            return None;
        }
        self.typing = typing;
        Some(if typing { TYPING_START } else { TYPING_STOP })
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }
}

/// A message accepted by [`ChatSession::begin_send`] that still has to go
/// out over the push channel.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub temp_id: String,
    pub receiver_id: String,
    pub message: String,
}

impl OutgoingMessage {
    fn payload(&self) -> Value {
        json!({
            "receiverId": self.receiver_id,
            "message": self.message,
            "clientTempId": self.temp_id,
        })
    }
}

/// One open conversation between the signed-in user and a peer.
pub struct ChatSession<B: ChatBackend, S: ChatSink> {
    backend: Arc<B>,
    sink: Arc<S>,
    user_id: String,
    peer_id: String,
    list: MessageList,
    pending: PendingSends,
    sending: bool,
    composer: TypingEdge,
    peer_typing: bool,
    error: Option<String>,
}

impl<B: ChatBackend, S: ChatSink> ChatSession<B, S> {
    pub fn new(backend: Arc<B>, sink: Arc<S>, user_id: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Self {
            backend,
            sink,
            user_id: user_id.into(),
            peer_id: peer_id.into(),
            list: MessageList::new(),
            pending: PendingSends::new(),
            sending: false,
            composer: TypingEdge::default(),
            peer_typing: false,
            error: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn messages(&self) -> &MessageList {
        &self.list
    }

    pub fn pending(&self) -> &PendingSends {
        &self.pending
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn peer_typing(&self) -> bool {
        self.peer_typing
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    fn in_conversation(&self, m: &Message) -> bool {
        (m.sender_id == self.user_id && m.receiver_id == self.peer_id)
            || (m.sender_id == self.peer_id && m.receiver_id == self.user_id)
    }

    pub async fn load_history(&mut self) -> Result<()> {
        match self.backend.conversation_messages(&self.peer_id).await {
            Ok(history) => {
                let at = now();
                self.list.reset(history, &self.user_id, &mut self.pending, at);
                self.pending.purge_expired(at);
                self.error = None;
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Adds the optimistic entry and pending record. Returns None for blank
    /// input or while another send from this composer is in flight.
    pub fn begin_send(&mut self, text: &str, at: DateTime<Utc>) -> Option<OutgoingMessage> {
        let text = text.trim();
        if text.is_empty() || self.sending {
            return None;
        }
        self.pending.purge_expired(at);
        self.sending = true;
        let temp_id = new_temp_id();
        self.list.upsert(Message {
            id: temp_id.clone(),
            sender_id: self.user_id.clone(),
            receiver_id: self.peer_id.clone(),
            message: text.to_string(),
            sent_at: at,
            is_deleted: false,
            client_temp_id: Some(temp_id.clone()),
        });
        self.pending.register(
            temp_id.clone(),
            PendingSendRecord { created_at: at, message: text.to_string(), receiver_id: self.peer_id.clone() },
        );
        Some(OutgoingMessage { temp_id, receiver_id: self.peer_id.clone(), message: text.to_string() })
    }

    /// Releases the send guard. A failed hand-off is reported but the
    /// optimistic entry stays visible; nothing is retried.
    pub fn complete_send(&mut self, outgoing: &OutgoingMessage, delivered: bool) {
        self.sending = false;
        if !delivered {
            log::warn!("message {} was not handed to the push channel", outgoing.temp_id);
            self.error = Some("Message not sent: connection lost.".into());
        }
    }

    /// Sends `text` and clears the typing indicator. Returns the temp id of
    /// the optimistic entry, or None when nothing was sent.
    pub async fn send(&mut self, text: &str) -> Option<String> {
        let outgoing = self.begin_send(text, now())?;
        let delivered = self.sink.emit(SEND_MESSAGE, outgoing.payload()).await;
        self.complete_send(&outgoing, delivered);
        self.input_changed("").await;
        Some(outgoing.temp_id)
    }

    /// Emits typing start/stop on empty/non-empty transitions only.
    pub async fn input_changed(&mut self, input: &str) {
        if let Some(signal) = self.composer.update(input) {
            let data = json!({ "senderId": self.user_id, "receiverId": self.peer_id });
            self.sink.emit(signal, data).await;
        }
    }

    /// Applies a decoded push event. Returns true when visible state changed.
    pub fn handle_event(&mut self, event: &ServerEvent) -> bool {
        self.handle_event_at(event, now())
    }

    pub fn handle_event_at(&mut self, event: &ServerEvent, at: DateTime<Utc>) -> bool {
        match event {
            ServerEvent::MessageBatch(batch) => {
                let ours: Vec<Message> = batch.iter().filter(|m| self.in_conversation(m)).cloned().collect();
                if ours.is_empty() {
                    return false;
                }
                let report = self.merge(ours, at);
                report != MergeReport::default()
            }
            ServerEvent::TypingStarted(sig) if sig.sender_id == self.peer_id => {
                let changed = !self.peer_typing;
                self.peer_typing = true;
                changed
            }
            ServerEvent::TypingStopped(sig) if sig.sender_id == self.peer_id => {
                let changed = self.peer_typing;
                self.peer_typing = false;
                changed
            }
            ServerEvent::MessageDeleted(sig) => self.list.mark_deleted(&sig.message_id),
            _ => false,
        }
    }

    fn merge(&mut self, batch: Vec<Message>, at: DateTime<Utc>) -> MergeReport {
        let report = self.list.merge_batch(batch, &self.user_id, &mut self.pending, at);
        let expired = self.pending.purge_expired(at);
        if !expired.is_empty() {
            log::debug!("{} sends never echoed back", expired.len());
        }
        report
    }

    /// Hides the message, deletes it on the server, and tells other clients.
    /// On failure the message is restored and marked `DeleteFailed`.
    /// Returns Ok(false) when the message cannot be deleted right now.
    pub async fn delete(&mut self, message_id: &str) -> Result<bool> {
        if !self.list.begin_delete(message_id) {
            return Ok(false);
        }
        match self.backend.delete_message(message_id).await {
            Ok(()) => {
                self.list.finish_delete(message_id);
                let data = json!({ "messageId": message_id, "receiverId": self.peer_id });
                self.sink.emit(MESSAGE_DELETED, data).await;
                Ok(true)
            }
            Err(e) => {
                let reason = e.user_message();
                self.list.fail_delete(message_id, reason.clone());
                self.error = Some(format!("Could not delete message: {}", reason));
                Err(e)
            }
        }
    }
}
