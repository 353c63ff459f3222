//! Parley core.
//!
//! Connection lifecycle for the realtime chat channel, written as a Sans-IO
//! state machine: methods take the current time and an input, mutate state,
//! and return [`ConnectionAction`]s for a driver to execute. Nothing here
//! opens sockets or sleeps.
//!
//! [`Environment`] abstracts time and randomness so the same logic runs
//! against the system clock in production and a virtual clock in simulation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod connection;
pub mod env;
pub mod error;
pub mod system_env;

pub use backoff::ReconnectConfig;
pub use connection::{
    ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState, LifecycleEvent,
};
pub use env::Environment;
pub use error::ConnectionError;
pub use system_env::SystemEnv;
