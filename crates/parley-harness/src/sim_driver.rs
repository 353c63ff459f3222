//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` connects a [`parley_client::Runtime`] to an in-memory
//! [`SimServer`] with virtual time, so the same orchestration code that runs
//! against a real socket runs deterministically in tests. Tests can refuse
//! connections, drop the transport, and hold server replies back to deliver
//! them in any order.

use std::collections::VecDeque;

use parley_client::{Client, ClientAction, ClientEvent, Driver, Runtime};
use parley_core::Environment;
use parley_proto::{ChatId, ClientCommand, ServerEvent};
use tracing::{debug, trace};

use crate::{
    sim_env::{SimEnv, SimInstant},
    sim_server::SimServer,
};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Runtime wired to a simulation driver.
pub type SimRuntime = Runtime<SimDriver, SimEnv>;

/// Simulation driver for deterministic testing.
pub struct SimDriver {
    env: SimEnv,
    server: SimServer,
    pending: VecDeque<ClientEvent<SimInstant>>,
    transport_open: bool,
    accept_connections: bool,
    hold_replies: bool,
    held: Vec<ServerEvent>,
    sent: Vec<ClientCommand>,
    actions: Vec<ClientAction>,
    opens: u32,
    history_requests: Vec<ChatId>,
}

impl SimDriver {
    /// Driver over `server`, sharing `env`'s clock.
    pub fn new(env: SimEnv, server: SimServer) -> Self {
        Self {
            env,
            server,
            pending: VecDeque::new(),
            transport_open: false,
            accept_connections: true,
            hold_replies: false,
            held: Vec::new(),
            sent: Vec::new(),
            actions: Vec::new(),
            opens: 0,
            history_requests: Vec::new(),
        }
    }

    /// Server model.
    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// Server model, mutably.
    pub fn server_mut(&mut self) -> &mut SimServer {
        &mut self.server
    }

    /// Queue an event for the client.
    pub fn inject(&mut self, event: ClientEvent<SimInstant>) {
        self.pending.push_back(event);
    }

    /// Queue a server event for the client.
    pub fn inject_server(&mut self, event: ServerEvent) {
        self.inject(ClientEvent::Server(event));
    }

    /// Next queued event, if any.
    pub fn next_event(&mut self) -> Option<ClientEvent<SimInstant>> {
        self.pending.pop_front()
    }

    /// Whether the transport is currently open.
    pub fn is_open(&self) -> bool {
        self.transport_open
    }

    /// Number of transport opens requested so far.
    pub fn opens(&self) -> u32 {
        self.opens
    }

    /// Accept (or refuse) future connection attempts.
    pub fn accept_connections(&mut self, accept: bool) {
        self.accept_connections = accept;
    }

    /// Hold server replies instead of delivering them.
    pub fn hold_replies(&mut self, hold: bool) {
        self.hold_replies = hold;
    }

    /// Take held server replies, in the order the server produced them.
    pub fn take_held(&mut self) -> Vec<ServerEvent> {
        std::mem::take(&mut self.held)
    }

    /// Commands the client wrote, drained.
    pub fn take_sent(&mut self) -> Vec<ClientCommand> {
        std::mem::take(&mut self.sent)
    }

    /// Actions the runtime executed, drained.
    pub fn take_actions(&mut self) -> Vec<ClientAction> {
        std::mem::take(&mut self.actions)
    }

    /// History fetches requested so far.
    pub fn history_requests(&self) -> &[ChatId] {
        &self.history_requests
    }

    /// Drop the transport as if the network failed.
    pub fn drop_transport(&mut self, reason: &str) {
        if !self.transport_open {
            return;
        }
        debug!(reason, "simulated transport drop");
        self.transport_open = false;
        self.server.drop_connection();
        self.inject_server(ServerEvent::Disconnect(reason.to_string()));
    }

    fn deliver(&mut self, events: Vec<ServerEvent>) {
        if self.hold_replies {
            self.held.extend(events);
        } else {
            self.pending.extend(events.into_iter().map(ClientEvent::Server));
        }
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn poll_event(&mut self) -> Result<Option<ClientEvent<SimInstant>>, SimDriverError> {
        Ok(self.next_event())
    }

    async fn open_transport(&mut self) -> Result<(), SimDriverError> {
        self.opens += 1;
        if self.transport_open {
            debug!("reopening live transport");
            self.server.drop_connection();
        }
        if self.accept_connections {
            self.transport_open = true;
            self.inject_server(ServerEvent::Connect);
        } else {
            self.inject_server(ServerEvent::ConnectError("connection refused".to_string()));
        }
        Ok(())
    }

    async fn close_transport(&mut self) -> Result<(), SimDriverError> {
        self.transport_open = false;
        self.server.drop_connection();
        Ok(())
    }

    async fn send_frame(&mut self, frame: String) -> Result<(), SimDriverError> {
        let command = ClientCommand::decode(&frame).map_err(|e| SimDriverError(e.to_string()))?;
        trace!(event = command.event_name(), "client frame");
        self.sent.push(command.clone());

        if !self.transport_open {
            debug!(event = command.event_name(), "frame written to closed transport");
            return Ok(());
        }
        let replies = self.server.handle(command);
        self.deliver(replies);
        Ok(())
    }

    async fn fetch_history(&mut self, chat_id: ChatId) -> Result<(), SimDriverError> {
        self.history_requests.push(chat_id);
        let result = self.server.history(chat_id);
        self.inject(ClientEvent::HistoryLoaded { chat_id, result });
        Ok(())
    }

    fn notify<E: Environment>(&mut self, _client: &Client<E>, action: &ClientAction) -> Result<(), SimDriverError> {
        self.actions.push(action.clone());
        Ok(())
    }

    fn now(&self) -> SimInstant {
        self.env.now()
    }

    fn stop(&mut self) {
        self.transport_open = false;
    }
}

/// Process queued events until the driver is idle.
///
/// # Errors
///
/// Returns the first driver error.
pub async fn settle(runtime: &mut SimRuntime) -> Result<(), SimDriverError> {
    while let Some(event) = runtime.driver_mut().next_event() {
        runtime.step(event).await?;
    }
    Ok(())
}

/// Runtime over `server` with default client configuration.
pub fn sim_runtime(env: &SimEnv, server: SimServer) -> SimRuntime {
    let driver = SimDriver::new(env.clone(), server);
    Runtime::new(driver, env.clone(), parley_client::ClientConfig::default())
}
