// src/server/initialization.rs

//! Handles server initialization: shared state setup and binding the listening endpoint.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::{RelayError, Registry};
use anyhow::Result;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::info;

/// Binds the listener and builds the shared state the accept loop runs on.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let listener = bind_listener(&config).await?;
    info!(
        "chatrelay listening on {} (backlog {})",
        listener.local_addr()?,
        config.backlog
    );

    let connection_permits = Arc::new(Semaphore::new(config.max_clients));

    Ok(ServerContext {
        config: Arc::new(config),
        registry: Arc::new(Registry::new()),
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        connection_permits,
    })
}

/// Creates the listening socket with address reuse and the configured backlog.
pub(crate) async fn bind_listener(config: &Config) -> Result<TcpListener, RelayError> {
    let bind_address = config.bind_address();
    let addr = resolve(&bind_address)
        .await
        .map_err(|e| RelayError::bind(&bind_address, e))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| RelayError::bind(&bind_address, e))?;

    socket
        .set_reuseaddr(true)
        .map_err(|e| RelayError::bind(&bind_address, e))?;
    socket
        .bind(addr)
        .map_err(|e| RelayError::bind(&bind_address, e))?;
    socket
        .listen(config.backlog)
        .map_err(|e| RelayError::bind(&bind_address, e))
}

async fn resolve(bind_address: &str) -> io::Result<SocketAddr> {
    tokio::net::lookup_host(bind_address)
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("'{bind_address}' did not resolve to any address"),
            )
        })
}

fn log_startup_info(config: &Config) {
    info!(
        "Framing: {:?}, max message size: {} bytes, send timeout: {:?}.",
        config.framing, config.max_message_size, config.send_timeout
    );
    info!("Server accepts at most {} concurrent clients.", config.max_clients);
}
