//! Inbound events (server → client).
//!
//! Transport lifecycle signals (`connect`, `connect_error`, `disconnect`,
//! `reconnect`) share the same sum type as server-originated events so a
//! single dispatcher handles everything the connection delivers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    ChatId, Envelope, MessageId, MessageStatus, TempId, UserId, WireMessage,
    errors::{ProtocolError, Result},
};

/// Confirmation of a send, correlating the temp id with the stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSent {
    /// Correlation key from the original `send_message`
    #[serde(rename = "tempId")]
    pub temp_id: TempId,
    /// Message as stored by the server
    pub message: WireMessage,
}

/// Status transition for a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStatusUpdated {
    /// Affected message
    pub message_id: MessageId,
    /// New status
    pub status: MessageStatus,
    /// User whose action caused the transition
    pub user_id: UserId,
}

/// A peer marked several messages as read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesReadBulk {
    /// Messages now read
    pub message_ids: Vec<MessageId>,
    /// Reader
    pub user_id: UserId,
    /// Conversation of the messages
    pub chat_id: ChatId,
}

/// Remote typing indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTyping {
    /// Conversation being typed in
    pub chat_id: ChatId,
    /// Typist
    pub user_id: UserId,
    /// Typing state
    pub is_typing: bool,
}

/// Online status of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// User
    pub user_id: UserId,
    /// Currently connected
    pub is_online: bool,
    /// Last time the user was seen online
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
struct CountData {
    count: u32,
}

#[derive(Serialize, Deserialize)]
struct MessageIdData {
    message_id: MessageId,
}

#[derive(Serialize, Deserialize)]
struct AuthErrorData {
    #[serde(default)]
    message: String,
}

/// Everything the realtime connection can deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Transport connected
    Connect,
    /// Transport failed to connect
    ConnectError(String),
    /// Transport disconnected
    Disconnect(String),
    /// Transport reconnected on its own
    Reconnect,
    /// Server accepted the authentication handshake
    Authenticated,
    /// Server rejected the authentication handshake
    AuthError(String),
    /// Messages queued while offline were delivered
    PendingMessagesDelivered(u32),
    /// A send from this client was stored
    MessageSent(MessageSent),
    /// A message was posted by any participant
    NewMessage(WireMessage),
    /// Single message status transition
    MessageStatusUpdated(MessageStatusUpdated),
    /// Bulk read receipt
    MessagesReadBulk(MessagesReadBulk),
    /// Remote typing indicator
    UserTyping(UserTyping),
    /// A message was soft-deleted
    MessageDeleted(MessageId),
    /// Presence change for one user
    PresenceUpdated(Presence),
    /// Presence snapshot for requested users
    PresenceInfo(Vec<Presence>),
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| ProtocolError::invalid_payload(event, &e))
}

/// Reason strings may arrive bare or wrapped in an object.
fn reason(data: Value) -> String {
    match data {
        Value::String(reason) => reason,
        Value::Null => String::new(),
        Value::Object(map) => map
            .get("reason")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

impl ServerEvent {
    /// Event name used on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::ConnectError(_) => "connect_error",
            Self::Disconnect(_) => "disconnect",
            Self::Reconnect => "reconnect",
            Self::Authenticated => "authenticated",
            Self::AuthError(_) => "auth_error",
            Self::PendingMessagesDelivered(_) => "pending_messages_delivered",
            Self::MessageSent(_) => "message_sent",
            Self::NewMessage(_) => "new_message",
            Self::MessageStatusUpdated(_) => "message_status_updated",
            Self::MessagesReadBulk(_) => "messages_read_bulk",
            Self::UserTyping(_) => "user_typing",
            Self::MessageDeleted(_) => "message_deleted",
            Self::PresenceUpdated(_) => "presence_updated",
            Self::PresenceInfo(_) => "presence_info",
        }
    }

    /// Decode a typed event from an envelope.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownEvent` if the name is not recognised
    /// - `ProtocolError::InvalidPayload` if the data has the wrong shape
    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        let Envelope { event, data } = envelope;
        let name = event.as_str();

        let decoded = match name {
            "connect" => Self::Connect,
            "connect_error" => Self::ConnectError(reason(data)),
            "disconnect" => Self::Disconnect(reason(data)),
            "reconnect" => Self::Reconnect,
            "authenticated" => Self::Authenticated,
            "auth_error" => {
                let AuthErrorData { message } = match data {
                    Value::String(message) => AuthErrorData { message },
                    other => payload(name, other)?,
                };
                Self::AuthError(message)
            },
            "pending_messages_delivered" => {
                let CountData { count } = payload(name, data)?;
                Self::PendingMessagesDelivered(count)
            },
            "message_sent" => Self::MessageSent(payload(name, data)?),
            "new_message" => Self::NewMessage(payload(name, data)?),
            "message_status_updated" => Self::MessageStatusUpdated(payload(name, data)?),
            "messages_read_bulk" => Self::MessagesReadBulk(payload(name, data)?),
            "user_typing" => Self::UserTyping(payload(name, data)?),
            "message_deleted" => {
                let MessageIdData { message_id } = payload(name, data)?;
                Self::MessageDeleted(message_id)
            },
            "presence_updated" => Self::PresenceUpdated(payload(name, data)?),
            "presence_info" => Self::PresenceInfo(payload(name, data)?),
            _ => return Err(ProtocolError::UnknownEvent(event)),
        };

        Ok(decoded)
    }

    /// Decode a typed event from envelope text.
    pub fn decode(text: &str) -> Result<Self> {
        Self::from_envelope(Envelope::from_text(text)?)
    }

    /// Wrap the event in an [`Envelope`].
    ///
    /// Used by simulated servers and transports that synthesise lifecycle
    /// signals.
    pub fn to_envelope(&self) -> Result<Envelope> {
        let data = match self {
            Self::Connect | Self::Reconnect | Self::Authenticated => Ok(Value::Null),
            Self::ConnectError(reason) | Self::Disconnect(reason) => {
                Ok(Value::String(reason.clone()))
            },
            Self::AuthError(message) => {
                serde_json::to_value(AuthErrorData { message: message.clone() })
            },
            Self::PendingMessagesDelivered(count) => {
                serde_json::to_value(CountData { count: *count })
            },
            Self::MessageSent(sent) => serde_json::to_value(sent),
            Self::NewMessage(message) => serde_json::to_value(message),
            Self::MessageStatusUpdated(update) => serde_json::to_value(update),
            Self::MessagesReadBulk(bulk) => serde_json::to_value(bulk),
            Self::UserTyping(typing) => serde_json::to_value(typing),
            Self::MessageDeleted(message_id) => {
                serde_json::to_value(MessageIdData { message_id: *message_id })
            },
            Self::PresenceUpdated(presence) => serde_json::to_value(presence),
            Self::PresenceInfo(list) => serde_json::to_value(list),
        }
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;

        Ok(Envelope::new(self.event_name(), data))
    }

    /// Encode the event as envelope text.
    pub fn encode(&self) -> Result<String> {
        self.to_envelope()?.to_text()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn decodes_message_sent() {
        let text = r#"{"event":"message_sent","data":{"tempId":"tmp-1","message":{"id":42,"chat_id":1,"sender_id":7,"content":"hi","created_at":"2024-05-01T10:00:00Z"}}}"#;
        let event = ServerEvent::decode(text).unwrap();

        match event {
            ServerEvent::MessageSent(sent) => {
                assert_eq!(sent.temp_id.as_str(), "tmp-1");
                assert_eq!(sent.message.id, 42);
                assert_eq!(sent.message.status, MessageStatus::Sent);
            },
            other => panic!("expected MessageSent, got {other:?}"),
        }
    }

    #[test]
    fn decodes_bare_disconnect_reason() {
        let event = ServerEvent::decode(r#"{"event":"disconnect","data":"transport close"}"#).unwrap();
        assert_eq!(event, ServerEvent::Disconnect("transport close".into()));
    }

    #[test]
    fn decodes_wrapped_connect_error_reason() {
        let event =
            ServerEvent::decode(r#"{"event":"connect_error","data":{"message":"timeout"}}"#)
                .unwrap();
        assert_eq!(event, ServerEvent::ConnectError("timeout".into()));
    }

    #[test]
    fn unknown_event_is_rejected() {
        let err = ServerEvent::decode(r#"{"event":"group_created","data":{}}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownEvent("group_created".into()));
    }

    #[test]
    fn wrong_payload_shape_is_rejected() {
        let err =
            ServerEvent::decode(r#"{"event":"message_deleted","data":{"id":"x"}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn status_update_round_trips() {
        let event = ServerEvent::MessageStatusUpdated(MessageStatusUpdated {
            message_id: 5,
            status: MessageStatus::Read,
            user_id: 2,
        });
        let decoded = ServerEvent::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }
}
