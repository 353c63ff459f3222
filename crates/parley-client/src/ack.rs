//! Read and delivery acknowledgement policy.
//!
//! Decides which acknowledgements a session emits in response to message
//! events. The UI never triggers these directly.

use parley_proto::{ChatId, ClientCommand, MessageId, MessageStatus, UserId};

use crate::message::ChatMessage;

/// Acknowledge delivery of incoming messages as they arrive.
pub const DEFAULT_MARK_DELIVERED_ON_RECEIPT: bool = true;

/// Acknowledge reads for messages shown in an open chat.
pub const DEFAULT_AUTO_MARK_READ: bool = true;

/// Acknowledge delivery for chats with no open session.
pub const DEFAULT_DELIVER_UNOPENED_CHATS: bool = true;

/// When to send delivered and read acknowledgements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckPolicy {
    /// Send `message_delivered` and mark delivered locally on receipt
    pub mark_delivered_on_receipt: bool,
    /// Send read acknowledgements for incoming messages in an open chat
    pub auto_mark_read: bool,
    /// Send `message_delivered` for chats that are not open
    pub deliver_unopened_chats: bool,
}

impl Default for AckPolicy {
    fn default() -> Self {
        Self {
            mark_delivered_on_receipt: DEFAULT_MARK_DELIVERED_ON_RECEIPT,
            auto_mark_read: DEFAULT_AUTO_MARK_READ,
            deliver_unopened_chats: DEFAULT_DELIVER_UNOPENED_CHATS,
        }
    }
}

impl AckPolicy {
    /// Acknowledgements for one incoming message, in send order.
    pub fn on_receipt(&self, chat_id: ChatId, message_id: MessageId) -> Vec<ClientCommand> {
        let mut commands = Vec::new();
        if self.mark_delivered_on_receipt {
            commands.push(ClientCommand::MessageDelivered { message_id });
        }
        if self.auto_mark_read {
            commands.push(ClientCommand::MessageRead { message_id, chat_id });
        }
        commands
    }
}

/// Messages from other users not yet read, in list order.
pub fn unread_from_others(messages: &[ChatMessage], local_user: UserId) -> Vec<MessageId> {
    messages
        .iter()
        .filter(|message| message.sender_id != local_user && message.status != MessageStatus::Read)
        .filter_map(ChatMessage::id)
        .collect()
}

/// Read acknowledgement for a batch: single for one id, bulk otherwise.
pub fn read_command(chat_id: ChatId, mut message_ids: Vec<MessageId>) -> Option<ClientCommand> {
    match message_ids.len() {
        0 => None,
        1 => message_ids.pop().map(|message_id| ClientCommand::MessageRead { message_id, chat_id }),
        _ => Some(ClientCommand::BulkMarkRead { chat_id, message_ids }),
    }
}
