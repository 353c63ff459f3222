//! Outbound commands (client → server).

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    ChatId, Envelope, MessageId, MessageKind, TempId, UserId,
    errors::{ProtocolError, Result},
};

/// Body of a `send_message` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Target conversation
    pub chat_id: ChatId,
    /// Text body
    pub content: String,
    /// Content kind
    pub message_type: MessageKind,
    /// Correlation key echoed back in `message_sent`
    #[serde(rename = "tempId")]
    pub temp_id: TempId,
    /// Optional attachment caption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Message being replied to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}

/// Commands the client emits on the realtime channel.
///
/// Each variant maps to exactly one event name (see [`Self::event_name`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Authentication handshake carrying the signed-in user
    Authenticate(UserId),

    /// Send a chat message
    SendMessage(OutgoingMessage),

    /// Acknowledge delivery of a single message
    MessageDelivered {
        /// Delivered message
        message_id: MessageId,
    },

    /// Acknowledge that a single message was read
    MessageRead {
        /// Read message
        message_id: MessageId,
        /// Conversation of the message
        chat_id: ChatId,
    },

    /// Acknowledge that several messages were read at once
    BulkMarkRead {
        /// Conversation of the messages
        chat_id: ChatId,
        /// Read messages
        message_ids: Vec<MessageId>,
    },

    /// Local user started or stopped typing
    Typing {
        /// Conversation being typed in
        chat_id: ChatId,
        /// Typing state
        is_typing: bool,
    },

    /// Ask for presence of the given users
    GetPresence(Vec<UserId>),

    /// Soft-delete a message
    DeleteMessage {
        /// Message to delete
        message_id: MessageId,
        /// Conversation of the message
        chat_id: ChatId,
    },

    /// Intentional disconnect notice
    Disconnect,
}

#[derive(Serialize, Deserialize)]
struct MessageDeliveredData {
    message_id: MessageId,
}

#[derive(Serialize, Deserialize)]
struct MessageRefData {
    message_id: MessageId,
    chat_id: ChatId,
}

#[derive(Serialize)]
struct BulkMarkReadData<'a> {
    chat_id: ChatId,
    message_ids: &'a [MessageId],
}

#[derive(Serialize, Deserialize)]
struct TypingData {
    chat_id: ChatId,
    is_typing: bool,
}

#[derive(Deserialize)]
struct BulkMarkReadOwned {
    chat_id: ChatId,
    message_ids: Vec<MessageId>,
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| ProtocolError::invalid_payload(event, &e))
}

impl ClientCommand {
    /// Event name used on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Authenticate(_) => "authenticate",
            Self::SendMessage(_) => "send_message",
            Self::MessageDelivered { .. } => "message_delivered",
            Self::MessageRead { .. } => "message_read",
            Self::BulkMarkRead { .. } => "bulk_mark_read",
            Self::Typing { .. } => "typing",
            Self::GetPresence(_) => "get_presence",
            Self::DeleteMessage { .. } => "delete_message",
            Self::Disconnect => "disconnect",
        }
    }

    /// Wrap the command in an [`Envelope`].
    pub fn to_envelope(&self) -> Result<Envelope> {
        let data = match self {
            Self::Authenticate(user_id) => serde_json::to_value(user_id),
            Self::SendMessage(message) => serde_json::to_value(message),
            Self::MessageDelivered { message_id } => {
                serde_json::to_value(MessageDeliveredData { message_id: *message_id })
            },
            Self::MessageRead { message_id, chat_id } | Self::DeleteMessage { message_id, chat_id } => {
                serde_json::to_value(MessageRefData { message_id: *message_id, chat_id: *chat_id })
            },
            Self::BulkMarkRead { chat_id, message_ids } => {
                serde_json::to_value(BulkMarkReadData { chat_id: *chat_id, message_ids })
            },
            Self::Typing { chat_id, is_typing } => {
                serde_json::to_value(TypingData { chat_id: *chat_id, is_typing: *is_typing })
            },
            Self::GetPresence(user_ids) => serde_json::to_value(user_ids),
            Self::Disconnect => Ok(serde_json::Value::Null),
        }
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;

        Ok(Envelope::new(self.event_name(), data))
    }

    /// Encode the command as envelope text.
    pub fn encode(&self) -> Result<String> {
        self.to_envelope()?.to_text()
    }

    /// Decode a command from an envelope. Server side of the channel.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownEvent` if the name is not a client command
    /// - `ProtocolError::InvalidPayload` if the data has the wrong shape
    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        let Envelope { event, data } = envelope;
        let name = event.as_str();

        let decoded = match name {
            "authenticate" => Self::Authenticate(payload(name, data)?),
            "send_message" => Self::SendMessage(payload(name, data)?),
            "message_delivered" => {
                let MessageDeliveredData { message_id } = payload(name, data)?;
                Self::MessageDelivered { message_id }
            },
            "message_read" => {
                let MessageRefData { message_id, chat_id } = payload(name, data)?;
                Self::MessageRead { message_id, chat_id }
            },
            "bulk_mark_read" => {
                let BulkMarkReadOwned { chat_id, message_ids } = payload(name, data)?;
                Self::BulkMarkRead { chat_id, message_ids }
            },
            "typing" => {
                let TypingData { chat_id, is_typing } = payload(name, data)?;
                Self::Typing { chat_id, is_typing }
            },
            "get_presence" => Self::GetPresence(payload(name, data)?),
            "delete_message" => {
                let MessageRefData { message_id, chat_id } = payload(name, data)?;
                Self::DeleteMessage { message_id, chat_id }
            },
            "disconnect" => Self::Disconnect,
            _ => return Err(ProtocolError::UnknownEvent(event)),
        };

        Ok(decoded)
    }

    /// Decode a command from envelope text.
    pub fn decode(text: &str) -> Result<Self> {
        Self::from_envelope(Envelope::from_text(text)?)
    }
}
