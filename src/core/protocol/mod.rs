// src/core/protocol/mod.rs

//! Wire framing between the relay and its peers.

pub mod codec;
pub use codec::{DEFAULT_MAX_MESSAGE_SIZE, Framing, MessageCodec};
