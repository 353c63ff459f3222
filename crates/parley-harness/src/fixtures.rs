//! Message and event builders for tests.

use chrono::{DateTime, Utc};
use parley_proto::{
    ChatId, MessageId, MessageKind, MessageSent, MessageStatus, MessageStatusUpdated,
    MessagesReadBulk, ServerEvent, TempId, UserId, UserTyping, WireMessage,
};

use crate::sim_env::SIM_EPOCH_SECS;

/// Fixed timestamp `offset_secs` after the simulation epoch.
pub fn timestamp(offset_secs: u64) -> DateTime<Utc> {
    let secs = i64::try_from(SIM_EPOCH_SECS + offset_secs).unwrap_or(i64::MAX);
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Builder for [`WireMessage`].
#[derive(Debug, Clone)]
pub struct WireBuilder {
    message: WireMessage,
}

impl WireBuilder {
    /// Text message `id` from `sender_id` in `chat_id`, status `sent`.
    pub fn new(id: MessageId, chat_id: ChatId, sender_id: UserId) -> Self {
        Self {
            message: WireMessage {
                id,
                chat_id,
                sender_id,
                content: format!("message {id}"),
                message_type: MessageKind::Text,
                status: MessageStatus::Sent,
                created_at: timestamp(id),
                is_deleted: false,
                caption: None,
                reply_to: None,
            },
        }
    }

    /// Set the content.
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.message.content = content.into();
        self
    }

    /// Set the server status.
    #[must_use]
    pub fn status(mut self, status: MessageStatus) -> Self {
        self.message.status = status;
        self
    }

    /// Mark as soft-deleted.
    #[must_use]
    pub fn deleted(mut self) -> Self {
        self.message.is_deleted = true;
        self
    }

    /// Finish.
    pub fn build(self) -> WireMessage {
        self.message
    }
}

/// Shorthand for a `sent` text message.
pub fn wire(id: MessageId, chat_id: ChatId, sender_id: UserId) -> WireMessage {
    WireBuilder::new(id, chat_id, sender_id).build()
}

/// History page in the order given; pass ids newest-first.
pub fn page(
    chat_id: ChatId,
    ids: impl IntoIterator<Item = MessageId>,
    sender_of: impl Fn(MessageId) -> UserId,
) -> Vec<WireMessage> {
    ids.into_iter().map(|id| wire(id, chat_id, sender_of(id))).collect()
}

/// `message_sent` confirmation.
pub fn confirmed(temp_id: &TempId, message: WireMessage) -> ServerEvent {
    ServerEvent::MessageSent(MessageSent { temp_id: temp_id.clone(), message })
}

/// `new_message` broadcast.
pub fn new_message(message: WireMessage) -> ServerEvent {
    ServerEvent::NewMessage(message)
}

/// `message_status_updated`.
pub fn status_updated(message_id: MessageId, status: MessageStatus, user_id: UserId) -> ServerEvent {
    ServerEvent::MessageStatusUpdated(MessageStatusUpdated { message_id, status, user_id })
}

/// `messages_read_bulk`.
pub fn read_bulk(chat_id: ChatId, message_ids: Vec<MessageId>, user_id: UserId) -> ServerEvent {
    ServerEvent::MessagesReadBulk(MessagesReadBulk { message_ids, user_id, chat_id })
}

/// `user_typing`.
pub fn user_typing(chat_id: ChatId, user_id: UserId, is_typing: bool) -> ServerEvent {
    ServerEvent::UserTyping(UserTyping { chat_id, user_id, is_typing })
}
