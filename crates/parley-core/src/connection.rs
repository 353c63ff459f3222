//! Connection lifecycle state machine.
//!
//! Owns the single realtime connection for the signed-in user: opening the
//! transport, sending the authentication handshake, scheduling reconnects
//! after unintentional drops, and closing cleanly when the app is
//! backgrounded. Uses the action pattern: methods take time as input and
//! return actions for the driver to execute.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect/foreground ┌────────────┐  transport open
//! │ Disconnected │───────────────────>│ Connecting │────────────────┐
//! └──────────────┘                    └────────────┘                │
//!     ^     ^                                                       v
//!     │     │ drop (retry scheduled)            ┌─────────────────────────┐
//!     │     └───────────────────────────────────│ Connected-Unauthenticated│
//!     │                                         └─────────────────────────┘
//!     │ disconnect/background/drop                │ handshake   ^ auth_error
//!     │                                           v             │
//!     │                                     ┌───────────────┐   │
//!     └─────────────────────────────────────│ Authenticated │───┘
//!                                           └───────────────┘
//! ```
//!
//! Authentication is re-sent on every successful open. It is never assumed
//! to survive a reconnect.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use parley_proto::{ClientCommand, ServerEvent, UserId};
use tracing::{debug, info, warn};

use crate::{backoff::ReconnectConfig, error::ConnectionError};

/// Notifications delivered to lifecycle observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Transport connected
    Connected,
    /// Server accepted the authentication handshake
    Authenticated,
    /// Transport closed, with the reason
    Disconnected(String),
    /// Transport came back after an unintentional drop
    Reconnected,
    /// Connection failure; see [`ConnectionError::is_transient`]
    ConnectionError(ConnectionError),
    /// Server flushed this many messages queued while offline
    PendingDelivered(u32),
}

/// Actions returned by the connection state machine.
///
/// The driver executes these:
/// - `OpenTransport`: start a transport connection attempt
/// - `CloseTransport`: tear the transport down
/// - `Send`: encode and write the command
/// - `Notify`: hand the event to lifecycle observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Start connecting the transport
    OpenTransport,
    /// Close the transport
    CloseTransport,
    /// Send this command to the server
    Send(ClientCommand),
    /// Report a lifecycle change
    Notify(LifecycleEvent),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport
    Disconnected,
    /// Transport connection attempt in flight
    Connecting,
    /// Transport up, handshake not sent or rejected by the server
    ConnectedUnauthenticated,
    /// Transport up and handshake sent
    Authenticated,
}

/// Connection configuration
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Reconnection policy after unintentional drops
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Copy)]
struct PendingRetry<I> {
    scheduled_at: I,
    delay: Duration,
}

/// Connection lifecycle manager.
///
/// One instance per signed-in user, constructed at sign-in and dropped at
/// sign-out. Pure state machine: no I/O, time is passed in.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct ConnectionManager<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    /// User to authenticate as. Kept across background/foreground.
    user_id: Option<UserId>,
    foreground: bool,
    /// Last close was requested by this client
    intentional: bool,
    /// Next successful open follows an unintentional drop
    recovering: bool,
    /// Reconnect attempts since the last successful open
    attempts: u32,
    retry: Option<PendingRetry<I>>,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a manager in [`ConnectionState::Disconnected`], app in
    /// foreground.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            user_id: None,
            foreground: true,
            intentional: false,
            recovering: false,
            attempts: 0,
            retry: None,
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// User this connection authenticates as.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Transport connected and handshake sent.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// A reconnect is scheduled and waiting for [`Self::tick`].
    #[must_use]
    pub fn retry_pending(&self) -> bool {
        self.retry.is_some()
    }

    /// Reconnect attempts made since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start a connection for `user_id`.
    ///
    /// Idempotent: a no-op while already connecting or connected for the same
    /// user. Connecting as a different user tears the current connection
    /// down first. While backgrounded the user is recorded and the transport
    /// opens on [`Self::app_foreground`].
    pub fn connect(&mut self, user_id: UserId) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if self.state != ConnectionState::Disconnected {
            if self.user_id == Some(user_id) {
                debug!(user_id, state = ?self.state, "connect ignored, already active");
                return actions;
            }
            actions.extend(self.disconnect());
        }

        self.user_id = Some(user_id);
        self.intentional = false;
        self.recovering = false;
        self.attempts = 0;
        self.retry = None;

        if !self.foreground {
            debug!(user_id, "connect deferred until foreground");
            return actions;
        }

        actions.push(self.begin_connecting());
        actions
    }

    /// Close the connection and forget the user.
    ///
    /// Always ends in [`ConnectionState::Disconnected`]. Tells the server the
    /// disconnect is intentional when the transport is up, and cancels any
    /// pending reconnect.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let actions = self.close_deliberately("client disconnect");
        self.user_id = None;
        self.recovering = false;
        actions
    }

    /// App moved to the background: close cleanly, remember the user.
    pub fn app_background(&mut self) -> Vec<ConnectionAction> {
        self.foreground = false;
        self.close_deliberately("app backgrounded")
    }

    /// App returned to the foreground: reconnect if a user is signed in.
    pub fn app_foreground(&mut self) -> Vec<ConnectionAction> {
        if self.foreground {
            return Vec::new();
        }
        self.foreground = true;

        match (self.user_id, self.state) {
            (Some(_), ConnectionState::Disconnected) => {
                self.intentional = false;
                self.attempts = 0;
                vec![self.begin_connecting()]
            },
            _ => Vec::new(),
        }
    }

    /// Transport reported a successful connect.
    ///
    /// Sends the authentication handshake unconditionally.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if no connection was wanted (after an
    ///   intentional close) or the transport is already connected
    pub fn transport_opened(&mut self) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let wanted = match self.state {
            ConnectionState::Connecting => true,
            ConnectionState::Disconnected => self.foreground && !self.intentional,
            ConnectionState::ConnectedUnauthenticated | ConnectionState::Authenticated => false,
        };

        let Some(user_id) = self.user_id.filter(|_| wanted) else {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "transport_opened",
            });
        };

        self.retry = None;
        self.attempts = 0;
        self.state = ConnectionState::ConnectedUnauthenticated;

        let mut actions = vec![ConnectionAction::Notify(LifecycleEvent::Connected)];
        if std::mem::take(&mut self.recovering) {
            actions.push(ConnectionAction::Notify(LifecycleEvent::Reconnected));
        }

        actions.push(ConnectionAction::Send(ClientCommand::Authenticate(user_id)));
        self.state = ConnectionState::Authenticated;
        info!(user_id, "authentication handshake sent");

        Ok(actions)
    }

    /// Transport closed.
    ///
    /// Schedules a reconnect unless this client asked for the close.
    pub fn transport_closed(&mut self, reason: impl Into<String>, now: I) -> Vec<ConnectionAction> {
        let reason = reason.into();
        if self.state == ConnectionState::Disconnected {
            debug!(%reason, "close ignored, already disconnected");
            return Vec::new();
        }

        info!(%reason, "transport closed");
        self.state = ConnectionState::Disconnected;

        let mut actions = vec![ConnectionAction::Notify(LifecycleEvent::Disconnected(reason))];
        self.recovering = true;
        actions.extend(self.schedule_retry(now));
        actions
    }

    /// Transport failed to connect or errored.
    ///
    /// Transient errors schedule a retry within the reconnect budget.
    pub fn transport_failed(&mut self, error: ConnectionError, now: I) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Disconnected {
            debug!(%error, "failure ignored, already disconnected");
            return Vec::new();
        }

        warn!(%error, attempt = self.attempts, "connection failed");
        self.state = ConnectionState::Disconnected;

        let transient = error.is_transient();
        let mut actions = vec![ConnectionAction::Notify(LifecycleEvent::ConnectionError(error))];
        if transient {
            actions.extend(self.schedule_retry(now));
        }
        actions
    }

    /// Fire a due reconnect.
    ///
    /// Call this periodically; it is the only place a scheduled retry turns
    /// into [`ConnectionAction::OpenTransport`].
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let Some(retry) = self.retry else {
            return Vec::new();
        };

        if self.state != ConnectionState::Disconnected {
            self.retry = None;
            return Vec::new();
        }

        if now - retry.scheduled_at < retry.delay {
            return Vec::new();
        }

        info!(attempt = self.attempts, "reconnecting");
        vec![self.begin_connecting()]
    }

    /// Apply a lifecycle event from the transport or server.
    ///
    /// Events that are not about the connection itself return no actions.
    pub fn handle_event(&mut self, event: &ServerEvent, now: I) -> Vec<ConnectionAction> {
        match event {
            ServerEvent::Connect => self.on_open(),
            ServerEvent::Reconnect => {
                if self.state == ConnectionState::Disconnected
                    || self.state == ConnectionState::Connecting
                {
                    self.recovering = true;
                }
                self.on_open()
            },
            ServerEvent::ConnectError(reason) => {
                self.transport_failed(ConnectionError::Transport(reason.clone()), now)
            },
            ServerEvent::Disconnect(reason) => self.transport_closed(reason.clone(), now),
            ServerEvent::Authenticated => self.on_authenticated(),
            ServerEvent::AuthError(message) => self.on_auth_error(message),
            ServerEvent::PendingMessagesDelivered(count) => {
                info!(count, "server delivered queued messages");
                vec![ConnectionAction::Notify(LifecycleEvent::PendingDelivered(*count))]
            },
            _ => Vec::new(),
        }
    }

    fn on_open(&mut self) -> Vec<ConnectionAction> {
        match self.transport_opened() {
            Ok(actions) => actions,
            Err(error) if self.state == ConnectionState::Disconnected => {
                debug!(%error, "closing unwanted transport");
                vec![ConnectionAction::CloseTransport]
            },
            Err(error) => {
                debug!(%error, "duplicate open ignored");
                Vec::new()
            },
        }
    }

    fn on_authenticated(&mut self) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::ConnectedUnauthenticated | ConnectionState::Authenticated => {
                self.state = ConnectionState::Authenticated;
                vec![ConnectionAction::Notify(LifecycleEvent::Authenticated)]
            },
            state => {
                debug!(?state, "authenticated ignored, no transport");
                Vec::new()
            },
        }
    }

    fn on_auth_error(&mut self, message: &str) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::ConnectedUnauthenticated | ConnectionState::Authenticated => {
                warn!(%message, "authentication rejected");
                self.state = ConnectionState::ConnectedUnauthenticated;
                vec![ConnectionAction::Notify(LifecycleEvent::ConnectionError(
                    ConnectionError::AuthRejected(message.to_string()),
                ))]
            },
            state => {
                debug!(?state, "auth_error ignored, no transport");
                Vec::new()
            },
        }
    }

    fn begin_connecting(&mut self) -> ConnectionAction {
        self.state = ConnectionState::Connecting;
        self.retry = None;
        ConnectionAction::OpenTransport
    }

    fn close_deliberately(&mut self, reason: &str) -> Vec<ConnectionAction> {
        self.retry = None;
        self.attempts = 0;
        self.intentional = true;

        let mut actions = Vec::new();
        match self.state {
            ConnectionState::Disconnected => return actions,
            ConnectionState::Connecting => actions.push(ConnectionAction::CloseTransport),
            ConnectionState::ConnectedUnauthenticated | ConnectionState::Authenticated => {
                actions.push(ConnectionAction::Send(ClientCommand::Disconnect));
                actions.push(ConnectionAction::CloseTransport);
            },
        }

        info!(reason, "closing connection");
        self.state = ConnectionState::Disconnected;
        actions.push(ConnectionAction::Notify(LifecycleEvent::Disconnected(reason.to_string())));
        actions
    }

    fn schedule_retry(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.user_id.is_none() || !self.foreground || self.intentional {
            return Vec::new();
        }

        let policy = &self.config.reconnect;
        if policy.is_exhausted(self.attempts) {
            let attempts = self.attempts;
            warn!(attempts, "reconnect attempts exhausted");
            self.retry = None;
            self.recovering = false;
            return vec![ConnectionAction::Notify(LifecycleEvent::ConnectionError(
                ConnectionError::ReconnectExhausted { attempts },
            ))];
        }

        let delay = policy.delay_for(self.attempts);
        self.attempts += 1;
        self.retry = Some(PendingRetry { scheduled_at: now, delay });
        debug!(attempt = self.attempts, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        Vec::new()
    }
}
