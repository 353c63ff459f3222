//! Event bus adapter.
//!
//! Turns inbound text frames into typed [`ServerEvent`]s and routes each one
//! to the component that owns it. Malformed frames and unknown event names
//! are logged and dropped; they never reach the state machines.

use parley_proto::{
    ChatId, ClientCommand, MessageId, MessageSent, MessageStatus, MessagesReadBulk, Presence,
    ProtocolError, ServerEvent, UserTyping, WireMessage,
};
use tracing::{debug, warn};

/// Where a decoded server event goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Lifecycle event for the connection manager
    Connection(ServerEvent),
    /// Message event for chat sessions
    Chat {
        /// Target chat, or `None` to offer the event to every open session
        chat_id: Option<ChatId>,
        /// The event
        event: ChatEvent,
    },
    /// Presence information
    Presence(Vec<Presence>),
}

/// Server events that concern chat sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Confirmation of a local send
    MessageSent(MessageSent),
    /// Message posted
    NewMessage(WireMessage),
    /// Single status change
    StatusUpdated {
        /// Message
        message_id: MessageId,
        /// New status
        status: MessageStatus,
    },
    /// Bulk read receipt
    ReadBulk(MessagesReadBulk),
    /// Soft delete
    Deleted(MessageId),
    /// Remote typing
    Typing(UserTyping),
}

/// Decode and route server events.
#[derive(Debug, Default, Clone)]
pub struct EventBus {
    decoded: u64,
    dropped: u64,
}

impl EventBus {
    /// Fresh bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames decoded since creation.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Frames dropped since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Decode one text frame and route it. `None` if the frame was dropped.
    pub fn decode(&mut self, text: &str) -> Option<Dispatch> {
        match ServerEvent::decode(text) {
            Ok(event) => {
                self.decoded += 1;
                Some(Self::route(event))
            },
            Err(ProtocolError::UnknownEvent(name)) => {
                self.dropped += 1;
                debug!(event = %name, "unknown server event dropped");
                None
            },
            Err(error) => {
                self.dropped += 1;
                warn!(%error, "malformed server frame dropped");
                None
            },
        }
    }

    /// Route an already-decoded event.
    ///
    /// Status updates and deletes carry no chat id, so they are offered to
    /// every session; sessions ignore ids they do not hold.
    pub fn route(event: ServerEvent) -> Dispatch {
        match event {
            ServerEvent::MessageSent(sent) => Dispatch::Chat {
                chat_id: Some(sent.message.chat_id),
                event: ChatEvent::MessageSent(sent),
            },
            ServerEvent::NewMessage(message) => Dispatch::Chat {
                chat_id: Some(message.chat_id),
                event: ChatEvent::NewMessage(message),
            },
            ServerEvent::MessageStatusUpdated(update) => Dispatch::Chat {
                chat_id: None,
                event: ChatEvent::StatusUpdated {
                    message_id: update.message_id,
                    status: update.status,
                },
            },
            ServerEvent::MessagesReadBulk(bulk) => Dispatch::Chat {
                chat_id: Some(bulk.chat_id),
                event: ChatEvent::ReadBulk(bulk),
            },
            ServerEvent::UserTyping(typing) => Dispatch::Chat {
                chat_id: Some(typing.chat_id),
                event: ChatEvent::Typing(typing),
            },
            ServerEvent::MessageDeleted(message_id) => {
                Dispatch::Chat { chat_id: None, event: ChatEvent::Deleted(message_id) }
            },
            ServerEvent::PresenceUpdated(presence) => Dispatch::Presence(vec![presence]),
            ServerEvent::PresenceInfo(presence) => Dispatch::Presence(presence),
            lifecycle => Dispatch::Connection(lifecycle),
        }
    }

    /// Encode a command as a text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if the payload cannot be serialized
    pub fn encode(command: &ClientCommand) -> Result<String, ProtocolError> {
        command.encode()
    }
}
