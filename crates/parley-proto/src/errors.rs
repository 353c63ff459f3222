//! Protocol error types.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding realtime envelopes and REST
/// bodies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame text is not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Envelope names an event this client does not understand.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Payload does not match the shape expected for the event name.
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload {
        /// Event name from the envelope
        event: String,
        /// Decoder error
        reason: String,
    },

    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Build an [`ProtocolError::InvalidPayload`] from a serde error.
    pub(crate) fn invalid_payload(event: &str, err: &serde_json::Error) -> Self {
        Self::InvalidPayload { event: event.to_string(), reason: err.to_string() }
    }
}
