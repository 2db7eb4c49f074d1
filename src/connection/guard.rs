// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use super::transport::Connection;
use crate::core::Registry;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

/// Guarantees that a connection leaves the registry and gives back its client
/// slot when its handler's scope is exited, including when the handler task is
/// aborted during shutdown.
pub struct ConnectionGuard {
    registry: Arc<Registry>,
    connection: Arc<Connection>,
    /// Held for the lifetime of the handler; dropping it frees a `max_clients` slot.
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConnectionGuard {
    pub(crate) fn new(
        registry: Arc<Registry>,
        connection: Arc<Connection>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            registry,
            connection,
            _permit: permit,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let id = self.connection.id();
        if let Some(remaining) = self.registry.take(id) {
            debug!(
                "ConnectionGuard removed {} ({}) on drop. Active connections: {}",
                self.connection.addr(),
                id,
                remaining
            );
        }
    }
}
