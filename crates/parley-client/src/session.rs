//! Per-chat reconciliation engine.
//!
//! A [`ChatSession`] owns the working set for one open conversation and
//! merges three independent inputs into it:
//!
//! - the one-time REST history page
//! - optimistic local sends
//! - realtime events, in whatever order the connection delivers them
//!
//! The list is newest-first. Placeholders are inserted at the head and
//! replaced in place on confirmation, never re-sorted by server timestamp.
//!
//! # Invariants
//!
//! - No two entries share a durable id
//! - At most one placeholder exists per temp id
//! - A message's status never moves backwards (see [`MessageStatus::merge`])
//!
//! # Early events
//!
//! A status update or delete can name a durable id the session has not seen
//! yet. Two races produce this: a read receipt overtaking the `message_sent`
//! confirmation of our own send, and any realtime event landing while the
//! history page that holds the message is still in flight. While either is
//! possible (placeholders unresolved or a load in flight) such events are
//! buffered, bounded with the oldest evicted, and folded in when the id
//! appears. The confirmed status is `max(sent, buffered)` and a buffered
//! delete tombstones the entry. Outside those windows they are dropped.

use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    ops::Sub,
    time::Duration,
};

use chrono::{DateTime, Utc};
use parley_proto::{
    ChatId, ClientCommand, MessageId, MessageSent, MessageStatus, MessagesReadBulk,
    OutgoingMessage, TempId, UserId, UserTyping, WireMessage,
};
use tracing::{debug, info, warn};

use crate::{
    ack::{self, AckPolicy},
    error::HistoryError,
    message::{ChatMessage, Draft},
    typing::{DEFAULT_TYPING_TIMEOUT, TypingTimer},
};

/// Early events kept per session.
pub const DEFAULT_EARLY_EVENT_CAPACITY: usize = 128;

/// Buffered realtime change for a message not in the list yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EarlyEvent {
    message_id: MessageId,
    status: Option<MessageStatus>,
    deleted: bool,
}

/// Chat session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inactivity window before a "stopped typing" signal is sent
    pub typing_timeout: Duration,
    /// Bound on buffered early events
    pub early_event_capacity: usize,
    /// Acknowledgement policy
    pub ack: AckPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            early_event_capacity: DEFAULT_EARLY_EVENT_CAPACITY,
            ack: AckPolicy::default(),
        }
    }
}

/// Point-in-time copy of a session's visible state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Conversation
    pub chat_id: ChatId,
    /// Messages, newest-first
    pub messages: Vec<ChatMessage>,
    /// Remote users typing, ascending
    pub typing_users: Vec<UserId>,
    /// History fetch in flight
    pub loading: bool,
    /// Last history failure
    pub error: Option<String>,
}

/// Working state for one open chat.
///
/// Pure state machine. Methods that may talk to the server take `ready`
/// (connection authenticated) and return the commands to send; nothing is
/// queued for later.
#[derive(Debug, Clone)]
pub struct ChatSession<I> {
    chat_id: ChatId,
    local_user: UserId,
    config: SessionConfig,
    /// Newest-first
    messages: Vec<ChatMessage>,
    typing_users: BTreeSet<UserId>,
    typing: TypingTimer<I>,
    /// Chat-open read sweep has run
    read_swept: bool,
    /// Sweep found unread messages while the connection was down
    sweep_owed: bool,
    loading: bool,
    error: Option<String>,
    /// Ids introduced by realtime events while a history fetch is in flight
    arrived_during_load: HashSet<MessageId>,
    early: VecDeque<EarlyEvent>,
    /// Bumped on every visible change
    revision: u64,
}

impl<I> ChatSession<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Empty session for `chat_id`, viewed by `local_user`.
    pub fn new(chat_id: ChatId, local_user: UserId, config: SessionConfig) -> Self {
        let typing = TypingTimer::new(config.typing_timeout);
        Self {
            chat_id,
            local_user,
            config,
            messages: Vec::new(),
            typing_users: BTreeSet::new(),
            typing,
            read_swept: false,
            sweep_owed: false,
            loading: false,
            error: None,
            arrived_during_load: HashSet::new(),
            early: VecDeque::new(),
            revision: 0,
        }
    }

    /// Conversation this session tracks.
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// User viewing the chat.
    pub fn local_user(&self) -> UserId {
        self.local_user
    }

    /// Messages, newest-first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Remote users currently typing.
    pub fn typing_users(&self) -> &BTreeSet<UserId> {
        &self.typing_users
    }

    /// Local user is marked as typing.
    pub fn is_typing(&self) -> bool {
        self.typing.is_typing()
    }

    /// History fetch in flight.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Last history failure, cleared by the next successful load.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Chat-open read sweep already ran.
    pub fn read_swept(&self) -> bool {
        self.read_swept
    }

    /// Chat-open read sweep is waiting for the connection.
    pub fn sweep_owed(&self) -> bool {
        self.sweep_owed
    }

    /// Early status and delete events currently buffered.
    pub fn early_event_count(&self) -> usize {
        self.early.len()
    }

    /// Change counter; differs whenever visible state changed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Copy of the visible state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            chat_id: self.chat_id,
            messages: self.messages.clone(),
            typing_users: self.typing_users.iter().copied().collect(),
            loading: self.loading,
            error: self.error.clone(),
        }
    }

    /// Confirmed message by durable id.
    pub fn find(&self, message_id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|message| message.id() == Some(message_id))
    }

    /// Placeholder by temp id.
    pub fn find_pending(&self, temp_id: &TempId) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .find(|message| message.is_pending() && message.temp_id() == Some(temp_id))
    }

    /// Start a history fetch.
    ///
    /// Returns `false` when one is already in flight; the caller must not
    /// fetch again.
    pub fn begin_load(&mut self) -> bool {
        if self.loading {
            debug!(chat_id = self.chat_id, "history load already in flight");
            return false;
        }
        self.loading = true;
        self.arrived_during_load.clear();
        true
    }

    /// Apply the outcome of a history fetch. `page` is newest-first.
    ///
    /// On failure the list is left untouched and the error recorded. On
    /// success the page replaces the working set, keeping placeholders and
    /// realtime arrivals from during the fetch. The first successful load
    /// also runs the read sweep.
    pub fn complete_load(
        &mut self,
        result: Result<Vec<WireMessage>, HistoryError>,
        ready: bool,
    ) -> Vec<ClientCommand> {
        if !self.loading {
            debug!(chat_id = self.chat_id, "history result without a load in flight dropped");
            return Vec::new();
        }
        self.loading = false;

        let page = match result {
            Ok(page) => page,
            Err(error) => {
                warn!(chat_id = self.chat_id, %error, "history load failed");
                self.error = Some(error.to_string());
                self.arrived_during_load.clear();
                self.discard_early_if_settled();
                self.touch();
                return Vec::new();
            },
        };

        self.error = None;
        let page_start = self.merge_history(page);
        self.discard_early_if_settled();
        self.touch();

        let unread = ack::unread_from_others(&self.messages[page_start..], self.local_user);
        self.read_sweep(unread, ready)
    }

    /// Optimistically send `draft` under `temp_id`.
    ///
    /// Blank content is ignored. When the connection is not ready the
    /// placeholder is created as failed and nothing is sent.
    pub fn send(
        &mut self,
        draft: Draft,
        temp_id: TempId,
        created_at: DateTime<Utc>,
        ready: bool,
    ) -> Vec<ClientCommand> {
        if draft.is_blank() {
            debug!(chat_id = self.chat_id, "blank message ignored");
            return Vec::new();
        }
        if self.find_pending(&temp_id).is_some() {
            debug!(chat_id = self.chat_id, %temp_id, "duplicate temp id ignored");
            return Vec::new();
        }

        let command = ready.then(|| {
            ClientCommand::SendMessage(OutgoingMessage {
                chat_id: self.chat_id,
                content: draft.content.clone(),
                message_type: draft.kind,
                temp_id: temp_id.clone(),
                caption: draft.caption.clone(),
                reply_to: draft.reply_to,
            })
        });

        let status = if ready {
            MessageStatus::Sending
        } else {
            warn!(chat_id = self.chat_id, %temp_id, "send failed, connection not ready");
            MessageStatus::Failed
        };

        let placeholder =
            ChatMessage::placeholder(self.chat_id, self.local_user, temp_id, draft, status, created_at);
        self.messages.insert(0, placeholder);
        self.touch();

        command.into_iter().collect()
    }

    /// Server confirmed one of our sends.
    pub fn on_message_sent(&mut self, sent: MessageSent) {
        let MessageSent { temp_id, message } = sent;

        let Some(mut index) = self.position_pending(&temp_id) else {
            debug!(chat_id = self.chat_id, %temp_id, "confirmation for unknown temp id dropped");
            return;
        };

        let message_id = message.id;

        // Broadcast of the same send that overtook the confirmation.
        let duplicate = self.position_confirmed(message_id).map(|position| {
            if position < index {
                index -= 1;
            }
            self.messages.remove(position)
        });

        let mut confirmed = ChatMessage::confirmed(message, Some(temp_id));
        confirmed.status = MessageStatus::Sent.merge(confirmed.status);
        if let Some(duplicate) = duplicate {
            confirmed.absorb(&duplicate);
        }

        self.apply_early(&mut confirmed);
        if let Some(slot) = self.messages.get_mut(index) {
            *slot = confirmed;
        }
        if self.loading {
            self.arrived_during_load.insert(message_id);
        }
        self.discard_early_if_settled();

        debug!(chat_id = self.chat_id, message_id, "send confirmed");
        self.touch();
    }

    /// A message was posted, by anyone.
    ///
    /// Duplicates by durable id are ignored. Messages from other users are
    /// acknowledged per the [`AckPolicy`] when the connection is ready.
    pub fn on_new_message(&mut self, message: WireMessage, ready: bool) -> Vec<ClientCommand> {
        if message.chat_id != self.chat_id {
            return Vec::new();
        }
        let message_id = message.id;
        if self.position_confirmed(message_id).is_some() {
            debug!(chat_id = self.chat_id, message_id, "duplicate message ignored");
            return Vec::new();
        }

        let mut message = ChatMessage::confirmed(message, None);
        self.apply_early(&mut message);

        let from_peer = message.sender_id != self.local_user;
        if from_peer && self.config.ack.mark_delivered_on_receipt {
            message.observe_status(MessageStatus::Delivered);
        }

        self.messages.insert(0, message);
        if self.loading {
            self.arrived_during_load.insert(message_id);
        }
        self.touch();

        if !from_peer {
            return Vec::new();
        }
        if !ready {
            debug!(chat_id = self.chat_id, message_id, "acknowledgements dropped, not ready");
            return Vec::new();
        }
        self.config.ack.on_receipt(self.chat_id, message_id)
    }

    /// Status change for one message.
    pub fn on_status_updated(&mut self, message_id: MessageId, status: MessageStatus) {
        match self.position_confirmed(message_id) {
            Some(index) => {
                let message = &mut self.messages[index];
                let before = message.status;
                message.observe_status(status);
                if message.status != before {
                    self.touch();
                }
            },
            None if self.buffering() => self.buffer_early(message_id, Some(status), false),
            None => {
                debug!(chat_id = self.chat_id, message_id, ?status, "status for unknown message dropped");
            },
        }
    }

    /// A peer read several messages.
    pub fn on_read_bulk(&mut self, bulk: &MessagesReadBulk) {
        if bulk.chat_id != self.chat_id {
            return;
        }
        for &message_id in &bulk.message_ids {
            self.on_status_updated(message_id, MessageStatus::Read);
        }
    }

    /// A message was soft-deleted. Position is preserved.
    pub fn on_deleted(&mut self, message_id: MessageId) {
        let Some(index) = self.position_confirmed(message_id) else {
            if self.buffering() {
                self.buffer_early(message_id, None, true);
            } else {
                debug!(chat_id = self.chat_id, message_id, "delete for unknown message dropped");
            }
            return;
        };
        if !self.messages[index].is_deleted {
            self.messages[index].tombstone();
            self.touch();
        }
    }

    /// Remote typing indicator.
    pub fn on_user_typing(&mut self, typing: &UserTyping) {
        if typing.chat_id != self.chat_id || typing.user_id == self.local_user {
            return;
        }
        let changed = if typing.is_typing {
            self.typing_users.insert(typing.user_id)
        } else {
            self.typing_users.remove(&typing.user_id)
        };
        if changed {
            self.touch();
        }
    }

    /// Local user started or stopped typing.
    ///
    /// Start is sent on the idle to typing transition; later calls only
    /// re-arm the inactivity timer. Stop is always sent immediately.
    pub fn set_typing(&mut self, is_typing: bool, now: I, ready: bool) -> Vec<ClientCommand> {
        match self.typing.set(is_typing, now) {
            Some(state) => self.typing_command(state, ready),
            None => Vec::new(),
        }
    }

    /// Ask the server to delete a confirmed message.
    ///
    /// The tombstone is applied when the server's `message_deleted` arrives.
    pub fn delete(&mut self, message_id: MessageId, ready: bool) -> Vec<ClientCommand> {
        if self.position_confirmed(message_id).is_none() {
            debug!(chat_id = self.chat_id, message_id, "delete of unknown message ignored");
            return Vec::new();
        }
        if !ready {
            debug!(chat_id = self.chat_id, message_id, "delete dropped, not ready");
            return Vec::new();
        }
        vec![ClientCommand::DeleteMessage { message_id, chat_id: self.chat_id }]
    }

    /// Fire the typing inactivity timer if due.
    pub fn tick(&mut self, now: I, ready: bool) -> Vec<ClientCommand> {
        if self.typing.expire(now) {
            debug!(chat_id = self.chat_id, "typing timed out");
            return self.typing_command(false, ready);
        }
        Vec::new()
    }

    /// Tear down: cancel the typing timer, owing a stop signal if typing.
    pub fn close(&mut self, ready: bool) -> Vec<ClientCommand> {
        self.loading = false;
        if self.typing.cancel() {
            return self.typing_command(false, ready);
        }
        Vec::new()
    }

    fn typing_command(&self, is_typing: bool, ready: bool) -> Vec<ClientCommand> {
        if !ready {
            debug!(chat_id = self.chat_id, is_typing, "typing signal dropped, not ready");
            return Vec::new();
        }
        vec![ClientCommand::Typing { chat_id: self.chat_id, is_typing }]
    }

    /// Replace the working set with `page`. Returns the index where page
    /// entries start.
    fn merge_history(&mut self, page: Vec<WireMessage>) -> usize {
        let page_ids: HashSet<MessageId> = page.iter().map(|message| message.id).collect();

        let mut kept = Vec::new();
        let mut previous: HashMap<MessageId, ChatMessage> = HashMap::new();
        for message in self.messages.drain(..) {
            match message.id() {
                None => kept.push(message),
                Some(id) if page_ids.contains(&id) => {
                    previous.insert(id, message);
                },
                Some(id) if self.arrived_during_load.contains(&id) => kept.push(message),
                Some(_) => {},
            }
        }

        let page_start = kept.len();
        let mut seen: HashSet<MessageId> = kept.iter().filter_map(ChatMessage::id).collect();
        let mut merged = kept;

        for wire in page {
            if !seen.insert(wire.id) {
                continue;
            }
            let mut message = ChatMessage::confirmed(wire, None);
            if let Some(id) = message.id()
                && let Some(prior) = previous.remove(&id)
            {
                message.key = prior.key.clone();
                message.absorb(&prior);
            }
            self.apply_early(&mut message);
            merged.push(message);
        }

        info!(
            chat_id = self.chat_id,
            fetched = merged.len() - page_start,
            kept = page_start,
            "history merged"
        );

        self.messages = merged;
        self.arrived_during_load.clear();
        page_start
    }

    /// Run a read sweep deferred by a connection that was not ready.
    ///
    /// Covers everything still unread from other users, so messages that
    /// arrived while offline are included.
    pub fn resume_read_sweep(&mut self, ready: bool) -> Vec<ClientCommand> {
        if !self.sweep_owed || !ready {
            return Vec::new();
        }
        let unread = ack::unread_from_others(&self.messages, self.local_user);
        self.read_sweep(unread, ready)
    }

    fn read_sweep(&mut self, unread: Vec<MessageId>, ready: bool) -> Vec<ClientCommand> {
        if !self.config.ack.auto_mark_read || self.read_swept {
            return Vec::new();
        }
        if unread.is_empty() {
            self.read_swept = true;
            self.sweep_owed = false;
            return Vec::new();
        }
        if !ready {
            debug!(chat_id = self.chat_id, count = unread.len(), "read sweep deferred, not ready");
            self.sweep_owed = true;
            return Vec::new();
        }

        self.read_swept = true;
        self.sweep_owed = false;
        info!(chat_id = self.chat_id, count = unread.len(), "marking history read");
        ack::read_command(self.chat_id, unread).into_iter().collect()
    }

    fn position_pending(&self, temp_id: &TempId) -> Option<usize> {
        self.messages
            .iter()
            .position(|message| message.is_pending() && message.temp_id() == Some(temp_id))
    }

    fn position_confirmed(&self, message_id: MessageId) -> Option<usize> {
        self.messages.iter().position(|message| message.id() == Some(message_id))
    }

    fn has_unresolved(&self) -> bool {
        self.messages.iter().any(ChatMessage::is_unresolved)
    }

    /// An unknown id may still show up: a send awaits confirmation or a
    /// history page is in flight.
    fn buffering(&self) -> bool {
        self.loading || self.has_unresolved()
    }

    fn discard_early_if_settled(&mut self) {
        if !self.buffering() && !self.early.is_empty() {
            debug!(chat_id = self.chat_id, count = self.early.len(), "unmatched early events dropped");
            self.early.clear();
        }
    }

    fn buffer_early(&mut self, message_id: MessageId, status: Option<MessageStatus>, deleted: bool) {
        if let Some(buffered) = self.early.iter_mut().find(|early| early.message_id == message_id) {
            buffered.status = match (buffered.status, status) {
                (Some(held), Some(new)) => Some(held.merge(new)),
                (held, new) => held.or(new),
            };
            buffered.deleted |= deleted;
            return;
        }
        if self.config.early_event_capacity == 0 {
            return;
        }
        if self.early.len() >= self.config.early_event_capacity {
            self.early.pop_front();
        }
        debug!(chat_id = self.chat_id, message_id, ?status, deleted, "early event buffered");
        self.early.push_back(EarlyEvent { message_id, status, deleted });
    }

    fn apply_early(&mut self, message: &mut ChatMessage) {
        let Some(id) = message.id() else {
            return;
        };
        let Some(index) = self.early.iter().position(|early| early.message_id == id) else {
            return;
        };
        let Some(early) = self.early.remove(index) else {
            return;
        };
        if let Some(status) = early.status {
            message.observe_status(status);
        }
        if early.deleted && !message.is_deleted {
            message.tombstone();
        }
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parley_proto::MessageKind;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct Ms(u64);

    impl Sub for Ms {
        type Output = Duration;

        fn sub(self, rhs: Self) -> Duration {
            Duration::from_millis(self.0.saturating_sub(rhs.0))
        }
    }

    const ME: UserId = 1;
    const PEER: UserId = 2;
    const CHAT: ChatId = 10;

    fn session() -> ChatSession<Ms> {
        ChatSession::new(CHAT, ME, SessionConfig::default())
    }

    fn at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn wire(id: MessageId, sender_id: UserId, status: MessageStatus) -> WireMessage {
        WireMessage {
            id,
            chat_id: CHAT,
            sender_id,
            content: format!("m{id}"),
            message_type: MessageKind::Text,
            status,
            created_at: at(),
            is_deleted: false,
            caption: None,
            reply_to: None,
        }
    }

    fn sent(temp: &str, id: MessageId) -> MessageSent {
        MessageSent { temp_id: TempId::new(temp), message: wire(id, ME, MessageStatus::Sent) }
    }

    #[test]
    fn send_inserts_placeholder_and_forwards() {
        let mut session = session();

        let commands = session.send(Draft::text("hi"), TempId::new("t1"), at(), true);

        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].status, MessageStatus::Sending);
        assert!(matches!(commands.as_slice(), [ClientCommand::SendMessage(out)] if out.temp_id.as_str() == "t1"));
    }

    #[test]
    fn send_while_not_ready_fails_synchronously() {
        let mut session = session();

        let commands = session.send(Draft::text("hi"), TempId::new("t1"), at(), false);

        assert!(commands.is_empty());
        assert_eq!(session.messages()[0].status, MessageStatus::Failed);
    }

    #[test]
    fn blank_send_is_ignored() {
        let mut session = session();
        assert!(session.send(Draft::text("   "), TempId::new("t1"), at(), true).is_empty());
        assert!(session.messages().is_empty());
    }

    #[test]
    fn confirmation_replaces_placeholder_in_place() {
        let mut session = session();
        session.send(Draft::text("first"), TempId::new("t1"), at(), true);
        session.send(Draft::text("second"), TempId::new("t2"), at(), true);

        session.on_message_sent(sent("t1", 42));

        let message = &session.messages()[1];
        assert_eq!(message.id(), Some(42));
        assert_eq!(message.status, MessageStatus::Sent);
        assert!(session.find_pending(&TempId::new("t1")).is_none());
    }

    #[test]
    fn unknown_confirmation_is_dropped() {
        let mut session = session();
        session.on_message_sent(sent("nope", 42));
        assert!(session.messages().is_empty());
    }

    #[test]
    fn peer_message_is_delivered_and_acknowledged() {
        let mut session = session();

        let commands = session.on_new_message(wire(5, PEER, MessageStatus::Sent), true);

        assert_eq!(session.messages()[0].status, MessageStatus::Delivered);
        assert_eq!(commands, vec![
            ClientCommand::MessageDelivered { message_id: 5 },
            ClientCommand::MessageRead { message_id: 5, chat_id: CHAT },
        ]);
    }

    #[test]
    fn acknowledgements_dropped_when_not_ready() {
        let mut session = session();
        assert!(session.on_new_message(wire(5, PEER, MessageStatus::Sent), false).is_empty());
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn status_never_regresses() {
        let mut session = session();
        session.on_new_message(wire(5, ME, MessageStatus::Sent), true);

        session.on_status_updated(5, MessageStatus::Read);
        session.on_status_updated(5, MessageStatus::Delivered);

        assert_eq!(session.find(5).unwrap().status, MessageStatus::Read);
    }

    #[test]
    fn read_before_confirmation_is_applied_on_confirm() {
        let mut session = session();
        session.send(Draft::text("hi"), TempId::new("t1"), at(), true);

        session.on_status_updated(42, MessageStatus::Read);
        assert_eq!(session.early_event_count(), 1);
        assert_eq!(session.messages()[0].status, MessageStatus::Sending);

        session.on_message_sent(sent("t1", 42));

        assert_eq!(session.find(42).unwrap().status, MessageStatus::Read);
        assert_eq!(session.early_event_count(), 0);
    }

    #[test]
    fn unknown_status_without_placeholders_is_dropped() {
        let mut session = session();
        session.on_status_updated(42, MessageStatus::Read);
        assert_eq!(session.early_event_count(), 0);
    }

    #[test]
    fn early_buffer_evicts_oldest() {
        let config = SessionConfig { early_event_capacity: 2, ..SessionConfig::default() };
        let mut session: ChatSession<Ms> = ChatSession::new(CHAT, ME, config);
        session.send(Draft::text("hi"), TempId::new("t1"), at(), true);

        session.on_status_updated(1, MessageStatus::Read);
        session.on_status_updated(2, MessageStatus::Read);
        session.on_status_updated(3, MessageStatus::Read);

        assert_eq!(session.early_event_count(), 2);
        session.on_message_sent(sent("t1", 1));
        assert_eq!(session.find(1).unwrap().status, MessageStatus::Sent);
    }

    #[test]
    fn broadcast_before_confirmation_collapses_to_one_entry() {
        let mut session = session();
        session.send(Draft::text("hi"), TempId::new("t1"), at(), true);
        session.on_new_message(wire(42, ME, MessageStatus::Delivered), true);
        assert_eq!(session.messages().len(), 2);

        session.on_message_sent(sent("t1", 42));

        assert_eq!(session.messages().len(), 1);
        let message = &session.messages()[0];
        assert_eq!(message.id(), Some(42));
        assert_eq!(message.status, MessageStatus::Delivered);
        assert_eq!(message.temp_id().map(TempId::as_str), Some("t1"));
    }

    #[test]
    fn broadcast_after_confirmation_is_ignored() {
        let mut session = session();
        session.send(Draft::text("hi"), TempId::new("t1"), at(), true);
        session.on_message_sent(sent("t1", 42));

        session.on_new_message(wire(42, ME, MessageStatus::Sent), true);

        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn delete_tombstones_in_place() {
        let mut session = session();
        session.on_new_message(wire(1, PEER, MessageStatus::Sent), true);
        session.on_new_message(wire(2, PEER, MessageStatus::Sent), true);

        session.on_deleted(1);

        assert_eq!(session.messages()[1].id(), Some(1));
        assert_eq!(session.messages()[1].content, crate::message::TOMBSTONE);
        assert!(session.messages()[1].is_deleted);
    }

    #[test]
    fn delete_request_waits_for_server_echo() {
        let mut session = session();
        session.on_new_message(wire(1, ME, MessageStatus::Sent), true);

        let commands = session.delete(1, true);

        assert_eq!(commands, vec![ClientCommand::DeleteMessage { message_id: 1, chat_id: CHAT }]);
        assert!(!session.find(1).unwrap().is_deleted);
    }

    #[test]
    fn remote_typing_set_semantics() {
        let mut session = session();
        let typing = |user_id, is_typing| UserTyping { chat_id: CHAT, user_id, is_typing };

        session.on_user_typing(&typing(PEER, true));
        session.on_user_typing(&typing(PEER, true));
        session.on_user_typing(&typing(ME, true));
        assert_eq!(session.typing_users().iter().copied().collect::<Vec<_>>(), vec![PEER]);

        session.on_user_typing(&typing(PEER, false));
        assert!(session.typing_users().is_empty());
    }

    #[test]
    fn typing_times_out_once() {
        let mut session = session();

        assert_eq!(session.set_typing(true, Ms(0), true), vec![ClientCommand::Typing {
            chat_id: CHAT,
            is_typing: true
        }]);
        assert!(session.tick(Ms(2499), true).is_empty());
        assert_eq!(session.tick(Ms(2500), true), vec![ClientCommand::Typing {
            chat_id: CHAT,
            is_typing: false
        }]);
        assert!(session.tick(Ms(6000), true).is_empty());
    }

    #[test]
    fn close_sends_final_stop() {
        let mut session = session();
        session.set_typing(true, Ms(0), true);

        assert_eq!(session.close(true), vec![ClientCommand::Typing { chat_id: CHAT, is_typing: false }]);
        assert!(session.tick(Ms(10_000), true).is_empty());
    }

    #[test]
    fn load_is_not_reentrant() {
        let mut session = session();
        assert!(session.begin_load());
        assert!(!session.begin_load());
    }

    #[test]
    fn failed_load_keeps_messages() {
        let mut session = session();
        session.on_new_message(wire(1, PEER, MessageStatus::Sent), true);

        session.begin_load();
        session.complete_load(Err(HistoryError::Status { status: 500 }), true);

        assert_eq!(session.messages().len(), 1);
        assert!(session.error().unwrap().contains("500"));
        assert!(!session.is_loading());
    }

    #[test]
    fn load_sweeps_unread_once() {
        let mut session = session();
        let page = vec![
            wire(3, PEER, MessageStatus::Delivered),
            wire(2, ME, MessageStatus::Sent),
            wire(1, PEER, MessageStatus::Read),
        ];

        session.begin_load();
        let first = session.complete_load(Ok(page.clone()), true);
        session.begin_load();
        let second = session.complete_load(Ok(page), true);

        assert_eq!(first, vec![ClientCommand::MessageRead { message_id: 3, chat_id: CHAT }]);
        assert!(second.is_empty());
        assert!(session.read_swept());
    }

    #[test]
    fn load_keeps_placeholders_and_arrivals_during_fetch() {
        let mut session = session();
        session.send(Draft::text("draft"), TempId::new("t1"), at(), true);

        session.begin_load();
        session.on_new_message(wire(9, PEER, MessageStatus::Sent), true);
        session.complete_load(Ok(vec![wire(2, PEER, MessageStatus::Read), wire(1, ME, MessageStatus::Read)]), true);

        let ids: Vec<_> = session.messages().iter().map(ChatMessage::id).collect();
        assert_eq!(ids, vec![Some(9), None, Some(2), Some(1)]);
    }

    #[test]
    fn realtime_events_during_load_survive_the_merge() {
        let mut session = session();

        session.begin_load();
        session.on_status_updated(100, MessageStatus::Read);
        session.on_deleted(101);
        session.on_read_bulk(&MessagesReadBulk { message_ids: vec![102], user_id: PEER, chat_id: CHAT });
        assert_eq!(session.early_event_count(), 3);

        session.complete_load(
            Ok(vec![
                wire(102, ME, MessageStatus::Delivered),
                wire(101, ME, MessageStatus::Sent),
                wire(100, ME, MessageStatus::Sent),
            ]),
            true,
        );

        assert_eq!(session.find(100).unwrap().status, MessageStatus::Read);
        assert!(session.find(101).unwrap().is_deleted);
        assert_eq!(session.find(101).unwrap().content, crate::message::TOMBSTONE);
        assert_eq!(session.find(102).unwrap().status, MessageStatus::Read);
        assert_eq!(session.early_event_count(), 0);
    }

    #[test]
    fn unmatched_events_during_load_are_discarded_after_merge() {
        let mut session = session();

        session.begin_load();
        session.on_status_updated(7, MessageStatus::Read);
        session.complete_load(Ok(vec![wire(1, PEER, MessageStatus::Read)]), true);

        assert_eq!(session.early_event_count(), 0);
    }

    #[test]
    fn events_during_failed_load_are_discarded() {
        let mut session = session();

        session.begin_load();
        session.on_deleted(7);
        session.complete_load(Err(HistoryError::Status { status: 503 }), true);

        assert_eq!(session.early_event_count(), 0);
    }

    #[test]
    fn sweep_deferred_while_offline_runs_once_ready() {
        let mut session = session();
        session.begin_load();

        let offline = session.complete_load(
            Ok(vec![wire(6, PEER, MessageStatus::Delivered), wire(5, PEER, MessageStatus::Delivered)]),
            false,
        );
        assert!(offline.is_empty());
        assert!(session.sweep_owed());
        assert!(!session.read_swept());
        assert!(session.resume_read_sweep(false).is_empty());

        let resumed = session.resume_read_sweep(true);

        assert_eq!(resumed, vec![ClientCommand::BulkMarkRead { chat_id: CHAT, message_ids: vec![6, 5] }]);
        assert!(session.read_swept());
        assert!(!session.sweep_owed());
        assert!(session.resume_read_sweep(true).is_empty());
    }

    #[test]
    fn resumed_sweep_includes_messages_received_offline() {
        let mut session = session();
        session.begin_load();
        session.complete_load(Ok(vec![wire(5, PEER, MessageStatus::Delivered)]), false);
        session.on_new_message(wire(6, PEER, MessageStatus::Sent), false);

        let resumed = session.resume_read_sweep(true);

        assert_eq!(resumed, vec![ClientCommand::BulkMarkRead { chat_id: CHAT, message_ids: vec![6, 5] }]);
    }

    #[test]
    fn explicit_stop_is_forwarded_when_idle() {
        let mut session = session();
        assert_eq!(session.set_typing(false, Ms(0), true), vec![ClientCommand::Typing {
            chat_id: CHAT,
            is_typing: false
        }]);
    }

    #[test]
    fn load_never_regresses_known_status() {
        let mut session = session();
        session.on_new_message(wire(1, ME, MessageStatus::Sent), true);
        session.on_status_updated(1, MessageStatus::Read);

        session.begin_load();
        session.complete_load(Ok(vec![wire(1, ME, MessageStatus::Delivered)]), true);

        assert_eq!(session.find(1).unwrap().status, MessageStatus::Read);
    }
}
