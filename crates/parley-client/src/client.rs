//! Client state machine.
//!
//! The [`Client`] is the top-level facade. It owns the connection manager,
//! the event bus adapter and one [`ChatSession`] per open chat, and turns
//! every [`ClientEvent`] into an ordered list of [`ClientAction`]s.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parley_core::{
    ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState, Environment,
};
use parley_proto::{ChatId, ClientCommand, Presence, TempId, UserId};
use tracing::{debug, info};

use crate::{
    bus::{ChatEvent, Dispatch, EventBus},
    error::ClientError,
    event::{ClientAction, ClientEvent},
    session::{ChatSession, SessionConfig},
};

/// Client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Connection and reconnect settings
    pub connection: ConnectionConfig,
    /// Settings applied to every chat session
    pub session: SessionConfig,
}

/// Realtime chat client.
///
/// Sans-IO: the caller executes the returned actions and feeds results back
/// as events. Time comes from the [`Environment`], except for
/// [`ClientEvent::Tick`] which carries its own.
pub struct Client<E: Environment> {
    env: E,
    config: ClientConfig,
    connection: ConnectionManager<E::Instant>,
    bus: EventBus,
    /// Open chats
    sessions: HashMap<ChatId, ChatSession<E::Instant>>,
    /// Last known presence per user
    presence: HashMap<UserId, Presence>,
}

impl<E: Environment> Client<E> {
    /// Signed-out client with no open chats.
    pub fn new(env: E, config: ClientConfig) -> Self {
        let connection = ConnectionManager::new(config.connection.clone());
        Self {
            env,
            config,
            connection,
            bus: EventBus::new(),
            sessions: HashMap::new(),
            presence: HashMap::new(),
        }
    }

    /// Environment the client runs in.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Signed-in user, if any.
    pub fn user_id(&self) -> Option<UserId> {
        self.connection.user_id()
    }

    /// Connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Whether commands are currently forwarded to the server.
    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    /// Event bus counters.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Session for an open chat.
    pub fn session(&self, chat_id: ChatId) -> Option<&ChatSession<E::Instant>> {
        self.sessions.get(&chat_id)
    }

    /// Ids of open chats, ascending.
    pub fn open_chats(&self) -> Vec<ChatId> {
        let mut chats: Vec<_> = self.sessions.keys().copied().collect();
        chats.sort_unstable();
        chats
    }

    /// Last known presence of `user_id`.
    pub fn presence(&self, user_id: UserId) -> Option<&Presence> {
        self.presence.get(&user_id)
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// - `ClientError::NotSignedIn` if opening a chat with no user
    /// - `ClientError::UnknownChat` if a chat operation names a chat that is
    ///   not open
    ///
    /// Errors leave state unchanged.
    pub fn handle(&mut self, event: ClientEvent<E::Instant>) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();

        match event {
            ClientEvent::FrameReceived(text) => {
                Ok(self.bus.decode(&text).map(|dispatch| self.dispatch(dispatch)).unwrap_or_default())
            },
            ClientEvent::Server(event) => Ok(self.dispatch(EventBus::route(event))),
            ClientEvent::HistoryLoaded { chat_id, result } => {
                let ready = self.is_ready();
                let Some(session) = self.sessions.get_mut(&chat_id) else {
                    debug!(chat_id, "history for closed chat dropped");
                    return Ok(Vec::new());
                };
                let before = session.revision();
                let commands = session.complete_load(result, ready);
                Ok(session_output(chat_id, session.revision() != before, commands))
            },
            ClientEvent::Tick { now } => Ok(self.tick(now)),

            ClientEvent::SignIn { user_id } => {
                info!(user_id, "signing in");
                let mut actions = Vec::new();
                if self.user_id().is_some_and(|current| current != user_id) {
                    actions.extend(self.close_all_sessions());
                    self.presence.clear();
                }
                actions.extend(connection_actions(self.connection.connect(user_id)));
                Ok(actions)
            },
            ClientEvent::SignOut => {
                info!("signing out");
                let mut actions = self.close_all_sessions();
                actions.extend(connection_actions(self.connection.disconnect()));
                self.presence.clear();
                Ok(actions)
            },
            ClientEvent::AppForeground => Ok(connection_actions(self.connection.app_foreground())),
            ClientEvent::AppBackground => Ok(connection_actions(self.connection.app_background())),

            ClientEvent::OpenChat { chat_id } => {
                let user_id =
                    self.user_id().ok_or(ClientError::NotSignedIn { operation: "open_chat" })?;
                let config = self.config.session.clone();
                self.sessions.entry(chat_id).or_insert_with(|| {
                    debug!(chat_id, "chat opened");
                    ChatSession::new(chat_id, user_id, config)
                });
                self.load(chat_id)
            },
            ClientEvent::CloseChat { chat_id } => {
                let ready = self.is_ready();
                let mut session =
                    self.sessions.remove(&chat_id).ok_or(ClientError::UnknownChat(chat_id))?;
                debug!(chat_id, "chat closed");
                Ok(session.close(ready).into_iter().map(ClientAction::Send).collect())
            },
            ClientEvent::LoadHistory { chat_id } => {
                if self.user_id().is_none() {
                    return Err(ClientError::NotSignedIn { operation: "load_history" });
                }
                self.load(chat_id)
            },
            ClientEvent::SendMessage { chat_id, draft } => {
                let ready = self.is_ready();
                let temp_id = TempId::from_random(self.env.random_u128());
                let created_at = self.wall_clock();
                let session = self.session_mut(chat_id)?;
                let before = session.revision();
                let commands = session.send(draft, temp_id, created_at, ready);
                Ok(session_output(chat_id, session.revision() != before, commands))
            },
            ClientEvent::SetTyping { chat_id, is_typing } => {
                let ready = self.is_ready();
                let session = self.session_mut(chat_id)?;
                Ok(session.set_typing(is_typing, now, ready).into_iter().map(ClientAction::Send).collect())
            },
            ClientEvent::DeleteMessage { chat_id, message_id } => {
                let ready = self.is_ready();
                let session = self.session_mut(chat_id)?;
                Ok(session.delete(message_id, ready).into_iter().map(ClientAction::Send).collect())
            },
            ClientEvent::RequestPresence { user_ids } => {
                if user_ids.is_empty() || !self.is_ready() {
                    debug!(count = user_ids.len(), "presence request skipped");
                    return Ok(Vec::new());
                }
                Ok(vec![ClientAction::Send(ClientCommand::GetPresence(user_ids))])
            },
        }
    }

    fn session_mut(&mut self, chat_id: ChatId) -> Result<&mut ChatSession<E::Instant>, ClientError> {
        self.sessions.get_mut(&chat_id).ok_or(ClientError::UnknownChat(chat_id))
    }

    fn load(&mut self, chat_id: ChatId) -> Result<Vec<ClientAction>, ClientError> {
        let session = self.session_mut(chat_id)?;
        if session.begin_load() {
            return Ok(vec![ClientAction::FetchHistory { chat_id }]);
        }
        Ok(Vec::new())
    }

    fn tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let mut actions = connection_actions(self.connection.tick(now));
        let ready = self.is_ready();
        for chat_id in self.open_chats() {
            if let Some(session) = self.sessions.get_mut(&chat_id) {
                actions.extend(session.tick(now, ready).into_iter().map(ClientAction::Send));
            }
        }
        actions
    }

    fn dispatch(&mut self, dispatch: Dispatch) -> Vec<ClientAction> {
        match dispatch {
            Dispatch::Connection(event) => {
                let now = self.env.now();
                let was_ready = self.is_ready();
                let mut actions = connection_actions(self.connection.handle_event(&event, now));
                if !was_ready && self.is_ready() {
                    actions.extend(self.resume_read_sweeps());
                }
                actions
            },
            Dispatch::Chat { chat_id: Some(chat_id), event } => self.chat_event(chat_id, event),
            Dispatch::Chat { chat_id: None, event } => self
                .open_chats()
                .into_iter()
                .flat_map(|chat_id| self.chat_event(chat_id, event.clone()))
                .collect(),
            Dispatch::Presence(updates) => self.presence_updates(updates),
        }
    }

    fn chat_event(&mut self, chat_id: ChatId, event: ChatEvent) -> Vec<ClientAction> {
        let ready = self.is_ready();
        let Some(session) = self.sessions.get_mut(&chat_id) else {
            return self.unopened_chat_event(chat_id, event, ready);
        };

        let before = session.revision();
        let commands = match event {
            ChatEvent::MessageSent(sent) => {
                session.on_message_sent(sent);
                Vec::new()
            },
            ChatEvent::NewMessage(message) => session.on_new_message(message, ready),
            ChatEvent::StatusUpdated { message_id, status } => {
                session.on_status_updated(message_id, status);
                Vec::new()
            },
            ChatEvent::ReadBulk(bulk) => {
                session.on_read_bulk(&bulk);
                Vec::new()
            },
            ChatEvent::Deleted(message_id) => {
                session.on_deleted(message_id);
                Vec::new()
            },
            ChatEvent::Typing(typing) => {
                session.on_user_typing(&typing);
                Vec::new()
            },
        };
        session_output(chat_id, session.revision() != before, commands)
    }

    /// Message events for chats without a session. Only delivery
    /// acknowledgements are sent; nothing is stored.
    fn unopened_chat_event(&self, chat_id: ChatId, event: ChatEvent, ready: bool) -> Vec<ClientAction> {
        let ChatEvent::NewMessage(message) = event else {
            return Vec::new();
        };
        let policy = &self.config.session.ack;
        let from_peer = self.user_id().is_some_and(|user_id| user_id != message.sender_id);
        if !from_peer || !policy.deliver_unopened_chats || !ready {
            return Vec::new();
        }
        debug!(chat_id, message_id = message.id, "delivered ack for unopened chat");
        vec![ClientAction::Send(ClientCommand::MessageDelivered { message_id: message.id })]
    }

    /// Sweeps owed by chats whose history arrived while offline.
    fn resume_read_sweeps(&mut self) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        for chat_id in self.open_chats() {
            if let Some(session) = self.sessions.get_mut(&chat_id) {
                actions.extend(session.resume_read_sweep(true).into_iter().map(ClientAction::Send));
            }
        }
        actions
    }

        fn presence_updates(&mut self, updates: Vec<Presence>) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        for presence in updates {
            if self.presence.get(&presence.user_id) == Some(&presence) {
                continue;
            }
            actions.push(ClientAction::PresenceChanged { user_id: presence.user_id });
            self.presence.insert(presence.user_id, presence);
        }
        actions
    }

    fn close_all_sessions(&mut self) -> Vec<ClientAction> {
        let ready = self.is_ready();
        let mut actions = Vec::new();
        for chat_id in self.open_chats() {
            if let Some(mut session) = self.sessions.remove(&chat_id) {
                actions.extend(session.close(ready).into_iter().map(ClientAction::Send));
            }
        }
        actions
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        i64::try_from(self.env.wall_clock_secs())
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_default()
    }
}

fn connection_actions(actions: Vec<ConnectionAction>) -> Vec<ClientAction> {
    actions
        .into_iter()
        .map(|action| match action {
            ConnectionAction::OpenTransport => ClientAction::OpenTransport,
            ConnectionAction::CloseTransport => ClientAction::CloseTransport,
            ConnectionAction::Send(command) => ClientAction::Send(command),
            ConnectionAction::Notify(event) => ClientAction::Lifecycle(event),
        })
        .collect()
}

fn session_output(chat_id: ChatId, changed: bool, commands: Vec<ClientCommand>) -> Vec<ClientAction> {
    let mut actions: Vec<_> = commands.into_iter().map(ClientAction::Send).collect();
    if changed {
        actions.push(ClientAction::SessionChanged { chat_id });
    }
    actions
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parley_core::{LifecycleEvent, SystemEnv};
    use parley_proto::{MessageKind, MessageStatus, ServerEvent, WireMessage};

    use super::*;
    use crate::message::Draft;

    const ME: UserId = 1;

    fn client() -> Client<SystemEnv> {
        Client::new(SystemEnv::new(), ClientConfig::default())
    }

    fn connected() -> Client<SystemEnv> {
        let mut client = client();
        client.handle(ClientEvent::SignIn { user_id: ME }).unwrap();
        client.handle(ClientEvent::Server(ServerEvent::Connect)).unwrap();
        client
    }

    fn wire(id: u64, chat_id: ChatId, sender_id: UserId) -> WireMessage {
        WireMessage {
            id,
            chat_id,
            sender_id,
            content: "hello".into(),
            message_type: MessageKind::Text,
            status: MessageStatus::Sent,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            is_deleted: false,
            caption: None,
            reply_to: None,
        }
    }

    #[test]
    fn sign_in_connects_and_authenticates() {
        let mut client = client();

        let actions = client.handle(ClientEvent::SignIn { user_id: ME }).unwrap();
        assert_eq!(actions, vec![ClientAction::OpenTransport]);

        let actions = client.handle(ClientEvent::Server(ServerEvent::Connect)).unwrap();
        assert_eq!(actions, vec![
            ClientAction::Lifecycle(LifecycleEvent::Connected),
            ClientAction::Send(ClientCommand::Authenticate(ME)),
        ]);
        assert!(client.is_ready());
    }

    #[test]
    fn open_chat_requires_user() {
        let mut client = client();
        assert_eq!(
            client.handle(ClientEvent::OpenChat { chat_id: 3 }).unwrap_err(),
            ClientError::NotSignedIn { operation: "open_chat" }
        );
    }

    #[test]
    fn open_chat_fetches_history_once() {
        let mut client = connected();

        let first = client.handle(ClientEvent::OpenChat { chat_id: 3 }).unwrap();
        let second = client.handle(ClientEvent::LoadHistory { chat_id: 3 }).unwrap();

        assert_eq!(first, vec![ClientAction::FetchHistory { chat_id: 3 }]);
        assert!(second.is_empty());
    }

    #[test]
    fn send_to_unopened_chat_is_rejected() {
        let mut client = connected();
        let error = client
            .handle(ClientEvent::SendMessage { chat_id: 9, draft: Draft::text("hi") })
            .unwrap_err();
        assert_eq!(error, ClientError::UnknownChat(9));
    }

    #[test]
    fn send_emits_command_and_change() {
        let mut client = connected();
        client.handle(ClientEvent::OpenChat { chat_id: 3 }).unwrap();

        let actions = client
            .handle(ClientEvent::SendMessage { chat_id: 3, draft: Draft::text("hi") })
            .unwrap();

        assert!(matches!(actions.as_slice(), [
            ClientAction::Send(ClientCommand::SendMessage(out)),
            ClientAction::SessionChanged { chat_id: 3 },
        ] if out.temp_id.as_str().starts_with("tmp-")));
    }

    #[test]
    fn unopened_chat_gets_delivered_ack_only() {
        let mut client = connected();

        let actions = client.handle(ClientEvent::Server(ServerEvent::NewMessage(wire(5, 8, 2)))).unwrap();

        assert_eq!(actions, vec![ClientAction::Send(ClientCommand::MessageDelivered { message_id: 5 })]);
        assert!(client.session(8).is_none());
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let mut client = connected();
        assert!(client.handle(ClientEvent::FrameReceived("{".into())).unwrap().is_empty());
        assert_eq!(client.bus().dropped(), 1);
    }

    #[test]
    fn presence_changes_are_reported_once() {
        let mut client = connected();
        let online = Presence { user_id: 2, is_online: true, last_seen: None };

        let first = client.handle(ClientEvent::Server(ServerEvent::PresenceUpdated(online.clone()))).unwrap();
        let again = client.handle(ClientEvent::Server(ServerEvent::PresenceInfo(vec![online]))).unwrap();

        assert_eq!(first, vec![ClientAction::PresenceChanged { user_id: 2 }]);
        assert!(again.is_empty());
        assert!(client.presence(2).unwrap().is_online);
    }

    #[test]
    fn history_loaded_before_connect_is_swept_once_ready() {
        let mut client = client();
        client.handle(ClientEvent::SignIn { user_id: ME }).unwrap();
        client.handle(ClientEvent::OpenChat { chat_id: 3 }).unwrap();

        let page = vec![wire(11, 3, 2), wire(10, 3, 2)];
        let offline = client.handle(ClientEvent::HistoryLoaded { chat_id: 3, result: Ok(page) }).unwrap();
        assert_eq!(offline, vec![ClientAction::SessionChanged { chat_id: 3 }]);

        let actions = client.handle(ClientEvent::Server(ServerEvent::Connect)).unwrap();

        assert_eq!(actions, vec![
            ClientAction::Lifecycle(LifecycleEvent::Connected),
            ClientAction::Send(ClientCommand::Authenticate(ME)),
            ClientAction::Send(ClientCommand::BulkMarkRead { chat_id: 3, message_ids: vec![11, 10] }),
        ]);
        assert!(client.session(3).unwrap().read_swept());

        let again = client.handle(ClientEvent::Server(ServerEvent::Authenticated)).unwrap();
        assert_eq!(again, vec![ClientAction::Lifecycle(LifecycleEvent::Authenticated)]);
    }

    #[test]
    fn sign_out_stops_typing_then_disconnects() {
        let mut client = connected();
        client.handle(ClientEvent::OpenChat { chat_id: 3 }).unwrap();
        client.handle(ClientEvent::SetTyping { chat_id: 3, is_typing: true }).unwrap();

        let actions = client.handle(ClientEvent::SignOut).unwrap();

        assert_eq!(actions[0], ClientAction::Send(ClientCommand::Typing { chat_id: 3, is_typing: false }));
        assert!(actions.contains(&ClientAction::Send(ClientCommand::Disconnect)));
        assert!(actions.contains(&ClientAction::CloseTransport));
        assert!(client.open_chats().is_empty());
        assert!(client.user_id().is_none());
    }
}
