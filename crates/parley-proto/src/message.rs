//! Message model shared by the realtime channel and the history endpoint.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChatId, MessageId, UserId};

/// Lifecycle status of a message.
///
/// Nominal progression is `Sending < Sent < Delivered < Read`. `Failed` is
/// only reachable from `Sending` and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Created locally, not yet acknowledged by the server
    Sending,
    /// Accepted by the server
    Sent,
    /// Delivered to the recipient's device
    Delivered,
    /// Seen by the recipient
    Read,
    /// Never left this client
    Failed,
}

impl MessageStatus {
    /// Position in the forward progression. `Failed` sits outside it.
    fn progress(self) -> u8 {
        match self {
            Self::Sending | Self::Failed => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
        }
    }

    /// Combine the current status with an observed one without regressing.
    ///
    /// The result is the highest-ranked status of the two, except that
    /// `Failed` wins only over `Sending` and is never left once entered.
    #[must_use]
    pub fn merge(self, observed: Self) -> Self {
        match (self, observed) {
            (Self::Failed, _) => Self::Failed,
            (Self::Sending, Self::Failed) => Self::Failed,
            (current, Self::Failed) => current,
            (current, observed) => {
                if observed.progress() > current.progress() {
                    observed
                } else {
                    current
                }
            },
        }
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Failed, next) => next == Self::Failed,
            (Self::Sending, Self::Failed) => true,
            (_, Self::Failed) => false,
            (current, next) => next.progress() >= current.progress(),
        }
    }

    /// Whether the recipient has seen this message.
    pub fn is_read(self) -> bool {
        self == Self::Read
    }
}

fn default_status() -> MessageStatus {
    MessageStatus::Sent
}

/// Content kind of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text
    #[default]
    Text,
    /// Image attachment
    Image,
    /// File attachment
    File,
    /// Audio clip
    Audio,
    /// Video clip
    Video,
    /// Kind introduced by a newer server
    #[serde(other)]
    Other,
}

/// Client-generated correlation key for an unconfirmed send.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(String);

impl TempId {
    /// Wrap an existing correlation key.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Build a temp id from 128 random bits.
    pub fn from_random(bits: u128) -> Self {
        Self(format!("tmp-{bits:032x}"))
    }

    /// Key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A server-confirmed message as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Durable id assigned by the server
    pub id: MessageId,

    /// Conversation the message belongs to
    pub chat_id: ChatId,

    /// Author
    pub sender_id: UserId,

    /// Text body (or attachment reference)
    pub content: String,

    /// Content kind
    #[serde(default)]
    pub message_type: MessageKind,

    /// Status as last known by the server
    #[serde(default = "default_status")]
    pub status: MessageStatus,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Soft-deletion flag
    #[serde(default)]
    pub is_deleted: bool,

    /// Optional attachment caption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// Message this one replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn merge_takes_highest_status() {
        assert_eq!(MessageStatus::Sent.merge(MessageStatus::Read), MessageStatus::Read);
        assert_eq!(MessageStatus::Read.merge(MessageStatus::Delivered), MessageStatus::Read);
        assert_eq!(MessageStatus::Delivered.merge(MessageStatus::Sent), MessageStatus::Delivered);
        assert_eq!(MessageStatus::Sending.merge(MessageStatus::Sent), MessageStatus::Sent);
    }

    #[test]
    fn failed_is_terminal_and_only_from_sending() {
        assert_eq!(MessageStatus::Sending.merge(MessageStatus::Failed), MessageStatus::Failed);
        assert_eq!(MessageStatus::Sent.merge(MessageStatus::Failed), MessageStatus::Sent);
        assert_eq!(MessageStatus::Failed.merge(MessageStatus::Read), MessageStatus::Failed);

        assert!(MessageStatus::Sending.can_advance_to(MessageStatus::Failed));
        assert!(!MessageStatus::Delivered.can_advance_to(MessageStatus::Failed));
        assert!(!MessageStatus::Failed.can_advance_to(MessageStatus::Sent));
    }

    #[test]
    fn unknown_kind_decodes_as_other() {
        let kind: MessageKind = serde_json::from_str("\"sticker\"").unwrap();
        assert_eq!(kind, MessageKind::Other);
    }

    #[test]
    fn missing_status_defaults_to_sent() {
        let json = r#"{"id":1,"chat_id":2,"sender_id":3,"content":"hi","created_at":"2024-01-01T00:00:00Z"}"#;
        let message: WireMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.message_type, MessageKind::Text);
        assert!(!message.is_deleted);
    }

    #[test]
    fn temp_id_from_random_is_stable() {
        assert_eq!(TempId::from_random(0xab).as_str(), "tmp-000000000000000000000000000000ab");
    }
}
