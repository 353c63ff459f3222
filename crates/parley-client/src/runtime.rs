//! Event loop joining a [`Client`] to a [`Driver`].
//!
//! Each input is handed to the client, and the actions it returns are
//! carried out in order: frames are encoded and written, history fetches
//! started, and the driver told about every change.

use parley_core::Environment;
use tracing::{trace, warn};

use crate::{Client, ClientAction, ClientConfig, ClientEvent, Driver, bus::EventBus};

/// A chat client bound to its driver `D`, with time and randomness from `E`.
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    client: Client<E>,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Signed-out client over `driver`.
    pub fn new(driver: D, env: E, config: ClientConfig) -> Self {
        Self { driver, client: Client::new(env, config) }
    }

    /// Client state.
    pub fn client(&self) -> &Client<E> {
        &self.client
    }

    /// Driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Driver, mutably; simulations reach the server model through it.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Handle inputs until the driver runs dry.
    ///
    /// # Errors
    ///
    /// Returns the first driver failure. Requests the client refuses (a chat
    /// that is not open, no signed-in user) are logged and skipped.
    pub async fn run(mut self) -> Result<(), D::Error> {
        while let Some(event) = self.driver.poll_event().await? {
            self.step(event).await?;
        }

        self.driver.stop();
        Ok(())
    }

    /// Handle one input and carry out what it produced.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails while executing an action.
    pub async fn step(&mut self, event: ClientEvent<E::Instant>) -> Result<(), D::Error> {
        match self.client.handle(event) {
            Ok(actions) => self.execute(actions).await,
            Err(error) => {
                warn!(%error, "event rejected");
                Ok(())
            },
        }
    }

    /// Fire reconnect and typing timers due at the driver's current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails while executing an action.
    pub async fn tick(&mut self) -> Result<(), D::Error> {
        let now = self.driver.now();
        self.step(ClientEvent::Tick { now }).await
    }

    async fn execute(&mut self, actions: Vec<ClientAction>) -> Result<(), D::Error> {
        for action in actions {
            trace!(?action, "executing");
            match &action {
                ClientAction::OpenTransport => self.driver.open_transport().await?,
                ClientAction::CloseTransport => self.driver.close_transport().await?,
                ClientAction::Send(command) => match EventBus::encode(command) {
                    Ok(frame) => self.driver.send_frame(frame).await?,
                    Err(error) => warn!(%error, event = command.event_name(), "command not encodable"),
                },
                ClientAction::FetchHistory { chat_id } => self.driver.fetch_history(*chat_id).await?,
                ClientAction::Lifecycle(_)
                | ClientAction::SessionChanged { .. }
                | ClientAction::PresenceChanged { .. } => {},
            }
            self.driver.notify(&self.client, &action)?;
        }
        Ok(())
    }
}
