// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a peer connection.

use super::guard::ConnectionGuard;
use super::transport::{Connection, ConnectionReader};
use crate::core::{Broadcaster, RelayError, metrics, notice};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, broadcast};
use tracing::{debug, info, warn};

/// Where a handler is in the lifecycle of its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Accepted, not yet registered and greeted.
    Connected,
    /// Reading and relaying messages.
    Active,
    /// Teardown in progress.
    Closing,
    /// Terminal.
    Closed,
}

/// Why a handler left the `Active` state.
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// The peer sent the disconnect keyword.
    Quit,
    /// The peer closed its side, or the connection was closed by a failed delivery.
    EndOfStream,
    /// A transport or decoding fault.
    Error(RelayError),
    /// The server is shutting down.
    ServerShutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Quit => write!(f, "quit"),
            DisconnectReason::EndOfStream => write!(f, "closed by peer"),
            DisconnectReason::Error(e) => write!(f, "error: {e}"),
            DisconnectReason::ServerShutdown => write!(f, "server shutdown"),
        }
    }
}

/// The next step for the handler's read loop to take.
enum NextAction {
    Continue,
    Disconnect,
}

/// Manages the full lifecycle of a peer connection.
pub struct ConnectionHandler {
    connection: Arc<Connection>,
    reader: ConnectionReader,
    broadcaster: Broadcaster,
    welcome: Bytes,
    shutdown_rx: broadcast::Receiver<()>,
    permit: Option<OwnedSemaphorePermit>,
    state: HandlerState,
}

impl ConnectionHandler {
    /// Wraps an accepted connection. Nothing happens until `run`.
    pub fn new(
        connection: Arc<Connection>,
        reader: ConnectionReader,
        broadcaster: Broadcaster,
        welcome: Bytes,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            connection,
            reader,
            broadcaster,
            welcome,
            shutdown_rx,
            permit: None,
            state: HandlerState::Connected,
        }
    }

    /// Attaches the `max_clients` slot this connection occupies.
    pub fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self.permit = Some(permit);
        self
    }

    fn transition(&mut self, next: HandlerState) {
        debug!(
            "Connection {} ({}): {:?} -> {:?}",
            self.connection.id(),
            self.connection.addr(),
            self.state,
            next
        );
        self.state = next;
    }

    /// Drives the connection from registration to teardown and returns why it
    /// ended. Errors never escape: every failure ends in `Closing`.
    pub async fn run(mut self) -> DisconnectReason {
        let registry = self.broadcaster.registry().clone();
        let _guard = ConnectionGuard::new(
            registry.clone(),
            self.connection.clone(),
            self.permit.take(),
        );
        let addr = self.connection.addr();

        let count = registry.add(self.connection.clone());
        info!("New connection from {}. Active connections: {}", addr, count);

        let reason = match self.greet().await {
            Ok(()) => {
                self.transition(HandlerState::Active);
                self.read_loop().await
            }
            Err(e) => DisconnectReason::Error(e),
        };

        self.transition(HandlerState::Closing);
        self.teardown(&reason).await;
        self.transition(HandlerState::Closed);
        reason
    }

    /// Sends the welcome notice to this peer and announces it to everyone else.
    async fn greet(&mut self) -> Result<(), RelayError> {
        self.connection.send(&self.welcome).await?;
        let join = notice::join(self.connection.addr());
        self.broadcaster
            .broadcast(&join, Some(self.connection.id()))
            .await;
        Ok(())
    }

    async fn read_loop(&mut self) -> DisconnectReason {
        loop {
            let received = tokio::select! {
                // Shutdown wins over a pending read.
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection handler for {} received shutdown signal.", self.connection.addr());
                    return DisconnectReason::ServerShutdown;
                }
                received = self.reader.receive() => received,
            };

            match received {
                Ok(Some(message)) => match self.process_message(message).await {
                    Ok(NextAction::Continue) => {}
                    Ok(NextAction::Disconnect) => return DisconnectReason::Quit,
                    Err(e) => return DisconnectReason::Error(e),
                },
                Ok(None) => return DisconnectReason::EndOfStream,
                Err(e) => return DisconnectReason::Error(e),
            }
        }
    }

    /// Relays one message from this peer, or reports that it asked to leave.
    async fn process_message(&mut self, message: Bytes) -> Result<NextAction, RelayError> {
        if message.is_empty() {
            return Ok(NextAction::Continue);
        }
        let text = std::str::from_utf8(&message).map_err(|_| RelayError::InvalidUtf8)?;
        if notice::is_disconnect_keyword(text) {
            return Ok(NextAction::Disconnect);
        }

        metrics::MESSAGES_RECEIVED_TOTAL.inc();
        let relayed = notice::relayed(self.connection.addr(), text);
        debug!("{}", String::from_utf8_lossy(&relayed));
        let report = self
            .broadcaster
            .broadcast(&relayed, Some(self.connection.id()))
            .await;
        debug!(
            "Relayed message from {}: delivered={}, failed={}",
            self.connection.addr(),
            report.delivered,
            report.failed
        );
        Ok(NextAction::Continue)
    }

    /// Closes the transport, leaves the registry and tells the remaining peers.
    async fn teardown(&mut self, reason: &DisconnectReason) {
        let addr = self.connection.addr();
        match reason {
            DisconnectReason::Error(e) if !e.is_normal_disconnect() => {
                warn!("Connection error for {}: {}", addr, e);
            }
            _ => debug!("Connection {} ending: {}", addr, reason),
        }

        let shutting_down = matches!(reason, DisconnectReason::ServerShutdown);
        if shutting_down {
            let _ = self.connection.send(&notice::shutdown()).await;
        }

        self.connection.close().await;
        let remaining = self
            .broadcaster
            .registry()
            .remove(self.connection.id());
        info!(
            "Client {} disconnected ({}). Active connections: {}",
            addr, reason, remaining
        );

        if !shutting_down {
            self.broadcaster
                .broadcast(&notice::departure(addr), Some(self.connection.id()))
                .await;
        }
    }
}
