//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture chat state at a point in time. The [`StatusRecorder`]
//! also keeps the status history of every message across snapshots so
//! monotonicity can be checked over a whole run.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    ops::Sub,
    time::Duration,
};

use parley_client::{ChatMessage, ChatSession, Client, MessageKey};
use parley_core::Environment;
use parley_proto::{ChatId, MessageId, MessageStatus, TempId, UserId};

/// Identity a message is tracked under for its whole life.
///
/// Messages sent locally are tracked by temp id, so a placeholder and the
/// confirmed message it becomes share one history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackedKey {
    /// Sent from this client
    Temp(TempId),
    /// Received from the server only
    Durable(MessageId),
}

impl TrackedKey {
    /// Tracking key for `message`.
    pub fn of(message: &ChatMessage) -> Self {
        match &message.key {
            MessageKey::Pending(temp_id) | MessageKey::Confirmed { temp_id: Some(temp_id), .. } => {
                Self::Temp(temp_id.clone())
            },
            MessageKey::Confirmed { id, temp_id: None } => Self::Durable(*id),
        }
    }
}

/// Snapshot of every open chat.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-chat snapshots, ascending chat id
    pub chats: Vec<ChatSnapshot>,
}

impl SystemSnapshot {
    /// Snapshot with a single chat.
    pub fn single(chat: ChatSnapshot) -> Self {
        Self { chats: vec![chat] }
    }
}

/// Snapshot of one chat session.
#[derive(Debug, Clone, Default)]
pub struct ChatSnapshot {
    /// Conversation
    pub chat_id: ChatId,
    /// Viewing user
    pub local_user: UserId,
    /// Messages, newest-first
    pub messages: Vec<ChatMessage>,
    /// Distinct statuses observed per message, in order
    pub status_history: BTreeMap<TrackedKey, Vec<MessageStatus>>,
}

/// Records status history across snapshots.
#[derive(Debug, Default)]
pub struct StatusRecorder {
    history: HashMap<ChatId, BTreeMap<TrackedKey, Vec<MessageStatus>>>,
}

impl StatusRecorder {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and snapshot one session.
    pub fn observe<I>(&mut self, session: &ChatSession<I>) -> ChatSnapshot
    where
        I: Copy + Ord + Sub<Output = Duration>,
    {
        let history = self.history.entry(session.chat_id()).or_default();

        // A message that left the list starts a fresh history if it returns.
        let present: HashSet<_> = session.messages().iter().map(TrackedKey::of).collect();
        history.retain(|key, _| present.contains(key));

        for message in session.messages() {
            let statuses = history.entry(TrackedKey::of(message)).or_default();
            if statuses.last() != Some(&message.status) {
                statuses.push(message.status);
            }
        }

        ChatSnapshot {
            chat_id: session.chat_id(),
            local_user: session.local_user(),
            messages: session.messages().to_vec(),
            status_history: history.clone(),
        }
    }

    /// Record and snapshot every open chat of `client`.
    pub fn observe_client<E: Environment>(&mut self, client: &Client<E>) -> SystemSnapshot {
        let chats = client
            .open_chats()
            .into_iter()
            .filter_map(|chat_id| client.session(chat_id))
            .map(|session| self.observe(session))
            .collect();
        SystemSnapshot { chats }
    }
}
