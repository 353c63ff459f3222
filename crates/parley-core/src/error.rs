//! Connection error types.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors surfaced by the connection lifecycle.
///
/// None of these are returned to callers of `connect`. They travel to
/// observers inside [`crate::LifecycleEvent::ConnectionError`], or come back
/// from driver-facing methods when the driver reports an input the current
/// state cannot accept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Input not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the input arrived
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Transport could not connect or dropped with an error
    #[error("transport error: {0}")]
    Transport(String),

    /// Server rejected the authentication handshake
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// Reconnection gave up
    #[error("reconnect failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },
}

impl ConnectionError {
    /// Returns true if this error may succeed on retry.
    ///
    /// Rejected credentials and exhausted retries need a new `connect`.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
