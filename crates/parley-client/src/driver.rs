//! Everything the chat client needs from the outside world.
//!
//! A driver owns one realtime socket and one history endpoint, and is the
//! only source of inputs: user requests, socket events, history results and
//! the clock all arrive through [`Driver::poll_event`]. `transport::WsDriver`
//! talks to a real server; the harness drives an in-memory one.

use std::{future::Future, ops::Sub, time::Duration};

use parley_core::Environment;
use parley_proto::ChatId;

use crate::{Client, ClientAction, ClientEvent};

/// Socket, history endpoint and event source for one signed-in client.
///
/// Methods that start I/O return once it is under way; outcomes come back
/// as events.
pub trait Driver: Send {
    /// Failure of the driver itself, never of the server.
    type Error: std::error::Error + Send + 'static;

    /// Clock the driver stamps ticks with; virtual under simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Next input for the client, or `None` once the app has shut down.
    fn poll_event(
        &mut self,
    ) -> impl Future<Output = Result<Option<ClientEvent<Self::Instant>>, Self::Error>> + Send;

    /// Open the realtime transport.
    ///
    /// Completion is reported later as a `connect` or `connect_error` event.
    fn open_transport(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close the realtime transport.
    fn close_transport(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Write one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error only for driver failures. A closed socket drops the
    /// frame; the client learns about it from the `disconnect` event.
    fn send_frame(&mut self, frame: String) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Start a history fetch; the result comes back as
    /// [`ClientEvent::HistoryLoaded`].
    fn fetch_history(&mut self, chat_id: ChatId) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Called after each action runs, so chat views and connection banners
    /// can refresh from `client`.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing the change fails.
    fn notify<E: Environment>(&mut self, client: &Client<E>, action: &ClientAction) -> Result<(), Self::Error>;

    /// Current time on the driver's clock.
    fn now(&self) -> Self::Instant;

    /// Drop the socket and any background tasks.
    fn stop(&mut self);
}
