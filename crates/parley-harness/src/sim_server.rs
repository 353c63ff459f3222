//! In-memory chat server model.
//!
//! `SimServer` answers decoded client commands the way the real server does
//! for a single connected user: it assigns durable ids, confirms sends,
//! tombstones deletes and answers presence queries. Tests drive it
//! explicitly and can reorder, duplicate or drop what it returns.

use std::collections::{BTreeMap, HashMap};

use parley_client::HistoryError;
use parley_proto::{
    ChatId, ClientCommand, MessageId, MessageSent, MessageStatus, OutgoingMessage, Presence,
    ServerEvent, UserId, WireMessage,
};
use tracing::debug;

use crate::fixtures::timestamp;

/// First id handed out by [`SimServer`].
pub const FIRST_MESSAGE_ID: MessageId = 1000;

/// Server-side model of the chat service.
#[derive(Debug)]
pub struct SimServer {
    next_message_id: MessageId,
    /// Stored messages per chat, oldest-first
    chats: BTreeMap<ChatId, Vec<WireMessage>>,
    presence: HashMap<UserId, Presence>,
    authenticated: Option<UserId>,
    reject_auth: bool,
    history_failure: Option<HistoryError>,
    echo_own_sends: bool,
    /// Commands received, in order
    received: Vec<ClientCommand>,
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimServer {
    /// Empty server that accepts any user.
    pub fn new() -> Self {
        Self {
            next_message_id: FIRST_MESSAGE_ID,
            chats: BTreeMap::new(),
            presence: HashMap::new(),
            authenticated: None,
            reject_auth: false,
            history_failure: None,
            echo_own_sends: false,
            received: Vec::new(),
        }
    }

    /// Also broadcast `new_message` to the sender after confirming a send.
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo_own_sends = echo;
        self
    }

    /// Reject (or accept) future authentication handshakes.
    pub fn reject_auth(&mut self, reject: bool) {
        self.reject_auth = reject;
    }

    /// Fail history requests with `failure` until cleared with `None`.
    pub fn fail_history(&mut self, failure: Option<HistoryError>) {
        self.history_failure = failure;
    }

    /// Store messages for `chat_id`, oldest-first.
    pub fn seed(&mut self, chat_id: ChatId, messages: impl IntoIterator<Item = WireMessage>) {
        self.chats.entry(chat_id).or_default().extend(messages);
    }

    /// Record a user's presence.
    pub fn set_presence(&mut self, presence: Presence) {
        self.presence.insert(presence.user_id, presence);
    }

    /// User that completed the handshake on the current connection.
    pub fn authenticated(&self) -> Option<UserId> {
        self.authenticated
    }

    /// Commands received so far.
    pub fn received(&self) -> &[ClientCommand] {
        &self.received
    }

    /// Stored message by id.
    pub fn message(&self, message_id: MessageId) -> Option<&WireMessage> {
        self.chats.values().flatten().find(|m| m.id == message_id)
    }

    /// REST history for `chat_id`, newest-first.
    pub fn history(&self, chat_id: ChatId) -> Result<Vec<WireMessage>, HistoryError> {
        if let Some(failure) = &self.history_failure {
            return Err(failure.clone());
        }
        let mut messages = self.chats.get(&chat_id).cloned().unwrap_or_default();
        messages.reverse();
        Ok(messages)
    }

    /// Transport dropped; the next connection must authenticate again.
    pub fn drop_connection(&mut self) {
        self.authenticated = None;
    }

    /// Another user posts a message. Returns the broadcast.
    pub fn post(&mut self, chat_id: ChatId, sender_id: UserId, content: impl Into<String>) -> ServerEvent {
        let message = self.store(chat_id, sender_id, content.into(), None);
        ServerEvent::NewMessage(message)
    }

    /// Apply one client command and return the events sent back.
    pub fn handle(&mut self, command: ClientCommand) -> Vec<ServerEvent> {
        self.received.push(command.clone());

        match command {
            ClientCommand::Authenticate(user_id) => {
                if self.reject_auth {
                    self.authenticated = None;
                    return vec![ServerEvent::AuthError("invalid user".to_string())];
                }
                self.authenticated = Some(user_id);
                vec![ServerEvent::Authenticated]
            },
            ClientCommand::SendMessage(outgoing) => self.on_send(outgoing),
            ClientCommand::MessageDelivered { message_id } => {
                self.advance(message_id, MessageStatus::Delivered);
                Vec::new()
            },
            ClientCommand::MessageRead { message_id, .. } => {
                self.advance(message_id, MessageStatus::Read);
                Vec::new()
            },
            ClientCommand::BulkMarkRead { message_ids, .. } => {
                for message_id in message_ids {
                    self.advance(message_id, MessageStatus::Read);
                }
                Vec::new()
            },
            ClientCommand::DeleteMessage { message_id, .. } => {
                let Some(message) = self.message_mut(message_id) else {
                    return Vec::new();
                };
                message.is_deleted = true;
                vec![ServerEvent::MessageDeleted(message_id)]
            },
            ClientCommand::GetPresence(user_ids) => {
                let known =
                    user_ids.iter().filter_map(|user_id| self.presence.get(user_id)).cloned().collect();
                vec![ServerEvent::PresenceInfo(known)]
            },
            ClientCommand::Typing { .. } => Vec::new(),
            ClientCommand::Disconnect => {
                self.authenticated = None;
                Vec::new()
            },
        }
    }

    fn on_send(&mut self, outgoing: OutgoingMessage) -> Vec<ServerEvent> {
        let Some(sender_id) = self.authenticated else {
            debug!(temp_id = %outgoing.temp_id, "send before authentication ignored");
            return Vec::new();
        };

        let temp_id = outgoing.temp_id.clone();
        let message = self.store(outgoing.chat_id, sender_id, outgoing.content.clone(), Some(&outgoing));

        let mut events = vec![ServerEvent::MessageSent(MessageSent { temp_id, message: message.clone() })];
        if self.echo_own_sends {
            events.push(ServerEvent::NewMessage(message));
        }
        events
    }

    fn store(
        &mut self,
        chat_id: ChatId,
        sender_id: UserId,
        content: String,
        outgoing: Option<&OutgoingMessage>,
    ) -> WireMessage {
        let id = self.next_message_id;
        self.next_message_id += 1;

        let message = WireMessage {
            id,
            chat_id,
            sender_id,
            content,
            message_type: outgoing.map(|o| o.message_type).unwrap_or_default(),
            status: MessageStatus::Sent,
            created_at: timestamp(id),
            is_deleted: false,
            caption: outgoing.and_then(|o| o.caption.clone()),
            reply_to: outgoing.and_then(|o| o.reply_to),
        };
        self.chats.entry(chat_id).or_default().push(message.clone());
        message
    }

    fn message_mut(&mut self, message_id: MessageId) -> Option<&mut WireMessage> {
        self.chats.values_mut().flatten().find(|m| m.id == message_id)
    }

    fn advance(&mut self, message_id: MessageId, status: MessageStatus) {
        if let Some(message) = self.message_mut(message_id) {
            message.status = message.status.merge(status);
        }
    }
}
