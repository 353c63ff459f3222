//! Local typing indicator timer.
//!
//! Owned by a chat session and dropped with it. Emits `typing{true}` on the
//! idle to typing transition, re-arms on every further keystroke, and emits
//! `typing{false}` when input stops for the inactivity window or the caller
//! stops explicitly.

use std::{ops::Sub, time::Duration};

/// Inactivity window after which typing is considered stopped.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(2500);

/// Cancellable inactivity timer for the local user's typing state.
#[derive(Debug, Clone)]
pub struct TypingTimer<I> {
    timeout: Duration,
    /// Time of the last keystroke while typing; `None` when idle
    armed_at: Option<I>,
}

impl<I> TypingTimer<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Idle timer with the given inactivity window.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, armed_at: None }
    }

    /// Local user is currently marked as typing.
    pub fn is_typing(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Record a typing change.
    ///
    /// Returns the state to send. A start is only sent on the idle to typing
    /// transition; a stop is always sent, so an explicit stop reaches the
    /// server even after the timer already fired.
    pub fn set(&mut self, is_typing: bool, now: I) -> Option<bool> {
        if is_typing {
            let was_typing = self.armed_at.replace(now).is_some();
            (!was_typing).then_some(true)
        } else {
            self.armed_at = None;
            Some(false)
        }
    }

    /// Whether the inactivity window has elapsed. Disarms when it has.
    pub fn expire(&mut self, now: I) -> bool {
        match self.armed_at {
            Some(armed_at) if now - armed_at >= self.timeout => {
                self.armed_at = None;
                true
            },
            _ => false,
        }
    }

    /// Disarm. Returns whether a stop signal is owed.
    pub fn cancel(&mut self) -> bool {
        self.armed_at.take().is_some()
    }
}
