//! Client error types.

use parley_proto::ChatId;
use thiserror::Error;

/// Errors returned by [`crate::Client::handle`].
///
/// All of these leave client state untouched. Races the server can cause
/// (confirmation for an unknown temp id, status for an unknown message) are
/// not errors and are dropped silently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Operation needs a signed-in user
    #[error("{operation} requires a signed-in user")]
    NotSignedIn {
        /// Operation that was attempted
        operation: &'static str,
    },

    /// No open session for the chat
    #[error("chat {0} is not open")]
    UnknownChat(ChatId),
}

/// Errors from the REST history fetch.
///
/// Surfaced to the chat session as an error string; the working message list
/// is left as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// No bearer token configured; no request was made
    #[error("not authenticated: missing bearer token")]
    MissingToken,

    /// Request could not be sent or the body could not be read
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a non-success HTTP status
    #[error("history request failed with status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Body did not match the history response shape
    #[error("invalid history response: {0}")]
    Decode(String),

    /// Server reported `success: false`
    #[error("history rejected: {0}")]
    Rejected(String),
}
