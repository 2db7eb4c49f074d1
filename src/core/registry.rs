// src/core/registry.rs

//! The set of live connections.

use crate::connection::{Connection, ConnectionId};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Tracks which connections are currently live, for broadcast purposes.
///
/// All access goes through a single mutex that is only held for the in-memory
/// mutation or copy, never across I/O. Broadcasting works on a `snapshot`, so a
/// fan-out neither blocks joins and departures nor observes the set mid-change.
/// Members are kept in join order.
#[derive(Debug, Default)]
pub struct Registry {
    members: Mutex<IndexMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection and returns the new member count.
    pub fn add(&self, connection: Arc<Connection>) -> usize {
        let mut members = self.members.lock();
        members.insert(connection.id(), connection);
        members.len()
    }

    /// Removes a connection if present and returns the new member count.
    /// Removing an absent connection is a no-op.
    pub fn remove(&self, id: ConnectionId) -> usize {
        let mut members = self.members.lock();
        members.shift_remove(&id);
        members.len()
    }

    /// Returns a copy of the current membership.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.members.lock().values().cloned().collect()
    }

    /// Removes a connection, returning the new member count only if it was a
    /// member.
    pub fn take(&self, id: ConnectionId) -> Option<usize> {
        let mut members = self.members.lock();
        members.shift_remove(&id).map(|_| members.len())
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Removes every member at once, returning them. Used on server shutdown.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.members.lock().drain(..).map(|(_, conn)| conn).collect()
    }
}
