// src/connection/mod.rs

//! Manages the lifecycle of a single peer connection: the transport wrapper,
//! the per-connection state machine and the cleanup guard.

// Declare the private sub-modules of the `connection` module.
mod guard;
mod handler;
mod transport;

// Publicly re-export the primary types from the sub-modules.
pub use guard::ConnectionGuard;
pub use handler::{ConnectionHandler, DisconnectReason, HandlerState};
pub use transport::{Connection, ConnectionId, ConnectionReader, ConnectionSettings};
