//! Parley client.
//!
//! Action-based chat client for the Parley realtime protocol. The
//! [`Client`] consumes [`ClientEvent`]s (server frames, UI intents, timer
//! ticks, history results) and returns [`ClientAction`]s for a driver to
//! execute. It never touches a socket itself.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                       Client                         │
//! │   ┌──────────────────┐      ┌────────────────────┐   │
//! │   │ ConnectionManager│      │  EventBus (decode  │   │
//! │   │ (parley-core)    │      │  and route frames) │   │
//! │   └──────────────────┘      └────────────────────┘   │
//! │   ┌──────────────────────────────────────────────┐   │
//! │   │ ChatSession per open chat                    │   │
//! │   │ (history merge, optimistic sends, status,    │   │
//! │   │  typing, acknowledgements)                   │   │
//! │   └──────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────┘
//!          ▲ ClientEvent              │ ClientAction
//!          │                          ▼
//! ┌──────────────────────────────────────────────────────┐
//! │  Runtime<Driver>: WsDriver (tokio) or a simulation   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! With the `transport` feature, [`transport::WsDriver`] connects to a real
//! server:
//!
//! ```ignore
//! let (driver, handle, notices) = WsDriver::new(TransportConfig::default());
//! let runtime = Runtime::new(driver, SystemEnv::new(), ClientConfig::default());
//! handle.submit(ClientEvent::SignIn { user_id: 7 }).await?;
//! runtime.run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ack;
pub mod bus;
mod client;
mod driver;
pub mod error;
mod event;
pub mod message;
mod runtime;
pub mod session;
#[cfg(feature = "transport")]
pub mod transport;
pub mod typing;

pub use ack::AckPolicy;
pub use bus::{ChatEvent, Dispatch, EventBus};
pub use client::{Client, ClientConfig};
pub use driver::Driver;
pub use error::{ClientError, HistoryError};
pub use event::{ClientAction, ClientEvent};
pub use message::{ChatMessage, Draft, MessageKey, TOMBSTONE};
pub use runtime::Runtime;
pub use session::{ChatSession, SessionConfig, SessionSnapshot};
pub use typing::TypingTimer;
