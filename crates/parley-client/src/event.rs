//! Client input events and output actions.
//!
//! The client is sans-IO: the driver feeds [`ClientEvent`]s in and executes
//! the [`ClientAction`]s that come back.

use parley_core::LifecycleEvent;
use parley_proto::{ChatId, ClientCommand, MessageId, ServerEvent, UserId, WireMessage};

use crate::{error::HistoryError, message::Draft};

/// Events fed into [`crate::Client::handle`].
#[derive(Debug, Clone)]
pub enum ClientEvent<I> {
    /// Raw text frame from the socket
    FrameReceived(String),
    /// Already-decoded server or transport event
    Server(ServerEvent),
    /// History fetch finished. Messages are newest-first.
    HistoryLoaded {
        /// Chat the fetch was for
        chat_id: ChatId,
        /// Page or failure
        result: Result<Vec<WireMessage>, HistoryError>,
    },
    /// Time advanced; drives reconnect and typing timers
    Tick {
        /// Current time
        now: I,
    },

    /// User signed in
    SignIn {
        /// Authenticated user
        user_id: UserId,
    },
    /// User signed out
    SignOut,
    /// App returned to the foreground
    AppForeground,
    /// App moved to the background
    AppBackground,

    /// Chat screen opened
    OpenChat {
        /// Conversation
        chat_id: ChatId,
    },
    /// Chat screen closed
    CloseChat {
        /// Conversation
        chat_id: ChatId,
    },
    /// Refresh history for an open chat
    LoadHistory {
        /// Conversation
        chat_id: ChatId,
    },
    /// Send a message
    SendMessage {
        /// Conversation
        chat_id: ChatId,
        /// Content
        draft: Draft,
    },
    /// Local typing state changed
    SetTyping {
        /// Conversation
        chat_id: ChatId,
        /// Typing or stopped
        is_typing: bool,
    },
    /// Delete a confirmed message
    DeleteMessage {
        /// Conversation
        chat_id: ChatId,
        /// Message to delete
        message_id: MessageId,
    },
    /// Ask for presence of a set of users
    RequestPresence {
        /// Users of interest
        user_ids: Vec<UserId>,
    },
}

/// Side effects for the driver to execute, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Open the socket
    OpenTransport,
    /// Close the socket
    CloseTransport,
    /// Write a command to the socket
    Send(ClientCommand),
    /// Fetch history over REST, then feed back [`ClientEvent::HistoryLoaded`]
    FetchHistory {
        /// Chat to fetch
        chat_id: ChatId,
    },
    /// Connection lifecycle notification for the UI
    Lifecycle(LifecycleEvent),
    /// A chat session's visible state changed
    SessionChanged {
        /// Chat that changed
        chat_id: ChatId,
    },
    /// A user's presence changed
    PresenceChanged {
        /// User that changed
        user_id: UserId,
    },
}
