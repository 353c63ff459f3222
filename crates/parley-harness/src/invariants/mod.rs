//! Chat-state invariants for simulation and fuzz runs.
//!
//! A check looks at one [`ChatSnapshot`] and reports what is wrong with it.
//! The [`InvariantRegistry`] runs every check over every chat of a
//! [`SystemSnapshot`] and tags each finding with the chat it came from, so a
//! failing property names the conversation and the rule together.
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let mut recorder = StatusRecorder::new();
//! registry.assert_all(&recorder.observe_client(&client), "after reconnect");
//! ```

mod checks;
mod snapshot;

use std::fmt;

use parley_proto::ChatId;

pub use checks::{StatusMonotonicity, TombstoneConsistency, UniqueDurableIds, UniquePlaceholders};
pub use snapshot::{ChatSnapshot, StatusRecorder, SystemSnapshot, TrackedKey};

/// A rule broken in one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Rule that failed
    pub invariant: &'static str,
    /// Chat it failed in
    pub chat_id: ChatId,
    /// Offending message and state
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] chat {}: {}", self.invariant, self.chat_id, self.detail)
    }
}

impl std::error::Error for Violation {}

/// A rule every open chat must satisfy after any step.
pub trait ChatInvariant: Send + Sync {
    /// Short identifier used in reports.
    fn name(&self) -> &'static str;

    /// Describe the first breach in `chat`, if any.
    fn check(&self, chat: &ChatSnapshot) -> Result<(), String>;
}

/// Set of checks run together.
#[derive(Default)]
pub struct InvariantRegistry {
    checks: Vec<Box<dyn ChatInvariant>>,
}

impl InvariantRegistry {
    /// No checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Message-list rules for a chat session:
    ///
    /// - [`UniqueDurableIds`]
    /// - [`UniquePlaceholders`]
    /// - [`StatusMonotonicity`]
    /// - [`TombstoneConsistency`]
    pub fn standard() -> Self {
        Self::new()
            .with(UniqueDurableIds)
            .with(UniquePlaceholders)
            .with(StatusMonotonicity)
            .with(TombstoneConsistency)
    }

    /// Add a check.
    #[must_use]
    pub fn with<C: ChatInvariant + 'static>(mut self, check: C) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// Every breach across every chat, in chat then check order.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> = state
            .chats
            .iter()
            .flat_map(|chat| {
                self.checks.iter().filter_map(move |check| {
                    check.check(chat).err().map(|detail| Violation {
                        invariant: check.name(),
                        chat_id: chat.chat_id,
                        detail,
                    })
                })
            })
            .collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Panic listing every breach, prefixed with `context`.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let report: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("chat state broken {context}:\n  {}", report.join("\n  "));
        }
    }

    /// Checks registered.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// No checks registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parley_client::ChatMessage;

    use super::*;
    use crate::fixtures::wire;

    #[test]
    fn no_chats_means_nothing_to_break() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 4);
        assert!(registry.check_all(&SystemSnapshot::default()).is_ok());
    }

    #[test]
    fn violations_name_the_chat() {
        let message = ChatMessage::confirmed(wire(5, 9, 2), None);
        let clean = ChatSnapshot { chat_id: 8, ..Default::default() };
        let broken = ChatSnapshot { chat_id: 9, messages: vec![message.clone(), message], ..Default::default() };
        let state = SystemSnapshot { chats: vec![clean, broken] };

        let violations = InvariantRegistry::standard().check_all(&state).unwrap_err();

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "unique_durable_ids");
        assert_eq!(violations[0].chat_id, 9);
    }
}
