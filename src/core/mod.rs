// src/core/mod.rs

//! The central module containing the relay's shared state and fan-out logic.

pub mod broadcast;
pub mod errors;
pub mod metrics;
pub mod notice;
pub mod protocol;
pub mod registry;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use errors::RelayError;
pub use registry::Registry;
