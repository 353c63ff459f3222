//! Parley wire model.
//!
//! Types exchanged with the chat server over the realtime channel and the REST
//! history endpoint. Nothing in this crate performs I/O.
//!
//! # Realtime channel
//!
//! Every frame on the duplex connection is a named event carried in a JSON
//! [`Envelope`]: `{"event": "<name>", "data": <payload>}`. Outbound frames are
//! produced from [`ClientCommand`], inbound frames decode into [`ServerEvent`].
//! Decoding dispatches on the event name the same way a frame decoder
//! dispatches on an opcode, so each name maps to exactly one variant.
//!
//! # REST boundary
//!
//! [`HistoryResponse`] is the body of `GET /messages/{chat_id}`. Messages come
//! back oldest-first.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod envelope;
mod errors;
mod event;
mod history;
mod message;

pub use command::{ClientCommand, OutgoingMessage};
pub use envelope::Envelope;
pub use errors::{ProtocolError, Result};
pub use event::{
    MessageSent, MessageStatusUpdated, MessagesReadBulk, Presence, ServerEvent, UserTyping,
};
pub use history::{HistoryPage, HistoryResponse};
pub use message::{MessageKind, MessageStatus, TempId, WireMessage};

/// Server-assigned durable message identifier.
pub type MessageId = u64;

/// Chat (conversation) identifier.
pub type ChatId = u64;

/// User identifier.
pub type UserId = u64;
