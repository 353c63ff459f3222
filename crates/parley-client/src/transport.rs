//! Production driver: WebSocket for the realtime channel, HTTP for history.
//!
//! The socket runs in its own task and reports everything it sees as client
//! events (`connect`, `connect_error`, `disconnect`, raw frames). A
//! deliberate close drops the writer and produces no `disconnect` event; the
//! connection manager already recorded it.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use futures_util::{SinkExt, StreamExt};
use parley_core::{Environment, LifecycleEvent};
use parley_proto::{ChatId, HistoryResponse, Presence, ServerEvent, WireMessage};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant as TokioInstant, Interval, MissedTickBehavior},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::{Client, ClientAction, ClientEvent, Driver, HistoryError, SessionSnapshot};

/// Default depth of the inbound event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default timer resolution for reconnect and typing timers.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Endpoints and credentials.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Realtime endpoint, `ws://` or `wss://`
    pub socket_url: String,
    /// REST base; history is `GET {api_base_url}/messages/{chat_id}`
    pub api_base_url: String,
    /// Bearer token for REST calls
    pub token: Option<String>,
    /// Inbound event channel depth
    pub channel_capacity: usize,
    /// Tick period
    pub tick_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_url: "ws://localhost:3000".to_string(),
            api_base_url: "http://localhost:3000/api".to_string(),
            token: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Driver failures.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The app-facing handle and all producers are gone
    #[error("driver channel closed")]
    ChannelClosed,
}

/// State changes pushed to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Connection lifecycle
    Lifecycle(LifecycleEvent),
    /// A chat's visible state changed
    Session(SessionSnapshot),
    /// A user's presence changed
    Presence(Presence),
}

/// REST history fetcher.
#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HistoryClient {
    /// Fetcher for `base_url`, authenticating with `token`.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), token }
    }

    /// Fetch history for `chat_id`, newest-first.
    ///
    /// # Errors
    ///
    /// - `HistoryError::MissingToken` before any request if no token is set
    /// - `HistoryError::Network` if the request fails
    /// - `HistoryError::Status` for a non-2xx response
    /// - `HistoryError::Decode` if the body is not a history response
    /// - `HistoryError::Rejected` if the server reports `success: false`
    pub async fn fetch(&self, chat_id: ChatId) -> Result<Vec<WireMessage>, HistoryError> {
        let Some(token) = self.token.as_deref() else {
            return Err(HistoryError::MissingToken);
        };

        let url = format!("{}/messages/{chat_id}", self.base_url.trim_end_matches('/'));
        debug!(%url, "fetching history");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| HistoryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status { status: status.as_u16() });
        }

        let body: HistoryResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                HistoryError::Decode(e.to_string())
            } else {
                HistoryError::Network(e.to_string())
            }
        })?;

        let message = body.message.clone();
        body.into_newest_first().ok_or(HistoryError::Rejected(message))
    }
}

enum Inbound {
    Event(ClientEvent<Instant>),
    Shutdown,
}

/// App-side handle for feeding UI events to a running [`WsDriver`].
#[derive(Clone)]
pub struct WsHandle {
    inbound: mpsc::Sender<Inbound>,
}

impl WsHandle {
    /// Queue a client event.
    ///
    /// # Errors
    ///
    /// - `TransportError::ChannelClosed` if the driver has stopped
    pub async fn submit(&self, event: ClientEvent<Instant>) -> Result<(), TransportError> {
        self.inbound.send(Inbound::Event(event)).await.map_err(|_| TransportError::ChannelClosed)
    }

    /// Ask the runtime loop to exit.
    ///
    /// # Errors
    ///
    /// - `TransportError::ChannelClosed` if the driver has stopped
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.inbound.send(Inbound::Shutdown).await.map_err(|_| TransportError::ChannelClosed)
    }
}

/// WebSocket and HTTP driver for tokio.
pub struct WsDriver {
    config: TransportConfig,
    history: Arc<HistoryClient>,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,
    /// Writer of the current socket
    outbound: Option<mpsc::UnboundedSender<String>>,
    socket: Option<JoinHandle<()>>,
    ticker: Interval,
    notices: mpsc::UnboundedSender<Notice>,
}

impl WsDriver {
    /// Build a driver, its app handle, and the UI notice stream.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: TransportConfig) -> (Self, WsHandle, mpsc::UnboundedReceiver<Notice>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (notices, notice_rx) = mpsc::unbounded_channel();

        let mut ticker =
            tokio::time::interval_at(TokioInstant::now() + config.tick_interval, config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let history = Arc::new(HistoryClient::new(config.api_base_url.clone(), config.token.clone()));
        let handle = WsHandle { inbound: inbound_tx.clone() };

        let driver = Self {
            config,
            history,
            inbound_tx,
            inbound_rx,
            outbound: None,
            socket: None,
            ticker,
            notices,
        };
        (driver, handle, notice_rx)
    }

    fn emit(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            debug!("notice receiver dropped");
        }
    }
}

impl Driver for WsDriver {
    type Error = TransportError;
    type Instant = Instant;

    async fn poll_event(&mut self) -> Result<Option<ClientEvent<Instant>>, TransportError> {
        tokio::select! {
            inbound = self.inbound_rx.recv() => match inbound {
                Some(Inbound::Event(event)) => Ok(Some(event)),
                Some(Inbound::Shutdown) => Ok(None),
                None => Err(TransportError::ChannelClosed),
            },
            tick = self.ticker.tick() => Ok(Some(ClientEvent::Tick { now: tick.into_std() })),
        }
    }

    async fn open_transport(&mut self) -> Result<(), TransportError> {
        if let Some(previous) = self.socket.take() {
            previous.abort();
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = Some(outbound_tx);

        let url = self.config.socket_url.clone();
        info!(%url, "opening socket");
        self.socket = Some(tokio::spawn(run_socket(url, self.inbound_tx.clone(), outbound_rx)));
        Ok(())
    }

    async fn close_transport(&mut self) -> Result<(), TransportError> {
        if self.outbound.take().is_some() {
            info!("closing socket");
        }
        // Writer drop makes the socket task send a close frame and exit.
        self.socket = None;
        Ok(())
    }

    async fn send_frame(&mut self, frame: String) -> Result<(), TransportError> {
        match &self.outbound {
            Some(outbound) if outbound.send(frame).is_ok() => {},
            _ => debug!("frame dropped, socket not open"),
        }
        Ok(())
    }

    async fn fetch_history(&mut self, chat_id: ChatId) -> Result<(), TransportError> {
        let history = Arc::clone(&self.history);
        let inbound = self.inbound_tx.clone();
        tokio::spawn(async move {
            let result = history.fetch(chat_id).await;
            if let Err(error) = &result {
                warn!(chat_id, %error, "history fetch failed");
            }
            let event = ClientEvent::HistoryLoaded { chat_id, result };
            if inbound.send(Inbound::Event(event)).await.is_err() {
                debug!(chat_id, "history result dropped, driver stopped");
            }
        });
        Ok(())
    }

    fn notify<E: Environment>(&mut self, client: &Client<E>, action: &ClientAction) -> Result<(), TransportError> {
        match action {
            ClientAction::Lifecycle(event) => self.emit(Notice::Lifecycle(event.clone())),
            ClientAction::SessionChanged { chat_id } => {
                if let Some(session) = client.session(*chat_id) {
                    self.emit(Notice::Session(session.snapshot()));
                }
            },
            ClientAction::PresenceChanged { user_id } => {
                if let Some(presence) = client.presence(*user_id) {
                    self.emit(Notice::Presence(presence.clone()));
                }
            },
            ClientAction::OpenTransport
            | ClientAction::CloseTransport
            | ClientAction::Send(_)
            | ClientAction::FetchHistory { .. } => {},
        }
        Ok(())
    }

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn stop(&mut self) {
        self.outbound = None;
        if let Some(socket) = self.socket.take() {
            socket.abort();
        }
    }
}

async fn run_socket(
    url: String,
    inbound: mpsc::Sender<Inbound>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let server = |event: ServerEvent| Inbound::Event(ClientEvent::Server(event));

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(error) => {
            warn!(%url, %error, "socket connect failed");
            let _ = inbound.send(server(ServerEvent::ConnectError(error.to_string()))).await;
            return;
        },
    };

    info!(%url, "socket connected");
    if inbound.send(server(ServerEvent::Connect)).await.is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(error) = write.send(Message::text(text)).await {
                        break error.to_string();
                    }
                },
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    debug!("socket closed by client");
                    return;
                },
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let frame = ClientEvent::FrameReceived(text.as_str().to_owned());
                    if inbound.send(Inbound::Event(frame)).await.is_err() {
                        return;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|frame| frame.reason.as_str().to_owned())
                        .unwrap_or_else(|| "closed by server".to_string());
                },
                Some(Ok(_)) => {},
                Some(Err(error)) => break error.to_string(),
                None => break "stream ended".to_string(),
            },
        }
    };

    info!(%reason, "socket disconnected");
    let _ = inbound.send(server(ServerEvent::Disconnect(reason))).await;
}
