//! Deterministic simulation harness for Parley client testing.
//!
//! Virtual-time implementations of the Environment and Driver traits, plus an
//! in-memory server model, so client behaviour can be exercised end to end
//! with reproducible timing and event order.
//!
//! # Chat-state rules
//!
//! Property tests and fuzz targets snapshot every open chat after each step
//! with a [`StatusRecorder`] and run [`InvariantRegistry::standard()`] over
//! it: one entry per durable id and per temp id, statuses that only move
//! forward, and deleted messages that show only the tombstone.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod invariants;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_server;

pub use invariants::{
    ChatInvariant, ChatSnapshot, InvariantRegistry, StatusMonotonicity, StatusRecorder,
    SystemSnapshot, TombstoneConsistency, TrackedKey, UniqueDurableIds, UniquePlaceholders,
    Violation,
};
pub use sim_driver::{SimDriver, SimDriverError, SimRuntime, settle, sim_runtime};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_server::{FIRST_MESSAGE_ID, SimServer};
