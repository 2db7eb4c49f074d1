// src/server/connection_loop.rs

//! The accept loop, and the ordered teardown that follows it.

use super::context::ServerContext;
use crate::connection::{Connection, ConnectionHandler, ConnectionId, ConnectionSettings};
use crate::core::{Broadcaster, metrics, notice};
use bytes::Bytes;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Pause after a transient accept failure (e.g. file descriptor exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Everything needed to turn an accepted socket into a running handler task.
struct Spawner {
    settings: ConnectionSettings,
    welcome: Bytes,
    broadcaster: Broadcaster,
    permits: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Spawner {
    fn spawn(&self, tasks: &mut JoinSet<()>, socket: TcpStream, addr: SocketAddr, id: ConnectionId) {
        if let Err(e) = socket.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }
        let (connection, reader) = Connection::new(socket, addr, id, self.settings);

        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                let handler = ConnectionHandler::new(
                    connection,
                    reader,
                    self.broadcaster.clone(),
                    self.welcome.clone(),
                    self.shutdown_tx.subscribe(),
                )
                .with_permit(permit);
                tasks.spawn(async move {
                    let reason = handler.run().await;
                    debug!("Handler for {} finished: {}", addr, reason);
                });
            }
            Err(_) => {
                warn!("Rejecting connection from {}: max_clients reached.", addr);
                metrics::REJECTED_CONNECTIONS_TOTAL.inc();
                tasks.spawn(async move {
                    if let Err(e) = connection.send(&notice::server_full()).await {
                        debug!("Failed to notify rejected client {}: {}", addr, e);
                    }
                    connection.close().await;
                });
            }
        }
    }
}

/// The main server loop that accepts connections until `shutdown` resolves,
/// then shuts every connection down.
pub async fn run<F>(ctx: ServerContext, shutdown: F)
where
    F: Future<Output = ()>,
{
    let ServerContext {
        config,
        registry,
        listener,
        shutdown_tx,
        mut background_tasks,
        connection_permits,
    } = ctx;

    let spawner = Spawner {
        settings: config.connection_settings(),
        welcome: Bytes::from(config.welcome_message.clone()),
        broadcaster: Broadcaster::new(registry.clone()),
        permits: connection_permits,
        shutdown_tx: shutdown_tx.clone(),
    };
    let mut next_connection_id: u64 = 0;
    let mut client_tasks = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown requested, initiating graceful shutdown.");
                break;
            }

            Some(res) = background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("Background task exited early; the relay keeps running without it."),
                    Ok(Err(e)) => { error!("Background task failed, stopping the relay: {:#}", e); break; }
                    Err(e) => { error!("Background task panicked, stopping the relay: {e:?}"); break; }
                }
            },

            res = listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        info!("Accepted new connection from: {}", addr);
                        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
                        next_connection_id = next_connection_id.wrapping_add(1);
                        spawner.spawn(&mut client_tasks, socket, addr, ConnectionId::new(next_connection_id));
                    }
                    Err(e) if is_fatal_accept_error(&e) => {
                        error!("CRITICAL: Listening endpoint is no longer usable: {}. Shutting down.", e);
                        break;
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A connection handler panicked: {e:?}");
                }
            },
        }
    }

    // Stop accepting before telling the handlers to wind down.
    drop(listener);

    info!("Listener closed. Signalling {} connection handler(s).", client_tasks.len());
    if shutdown_tx.send(()).is_err() {
        debug!("No tasks were subscribed to the shutdown signal.");
    }

    let drained = tokio::time::timeout(config.shutdown_timeout, async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("Timed out waiting for connection handlers, aborting the remaining ones.");
        client_tasks.shutdown().await;
    }

    for connection in registry.drain() {
        connection.close().await;
    }
    info!("Every client connection is closed.");
    if tokio::time::timeout(config.shutdown_timeout, async {
        while background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Background tasks outlived the shutdown timeout, aborting them.");
        background_tasks.shutdown().await;
    };
    info!("Relay stopped.");
}

/// Resolves when the process receives SIGINT or SIGTERM (Ctrl-C elsewhere).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("SIGINT received."),
                    _ = sigterm.recv() => info!("SIGTERM received."),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to register signal handlers: {}. Falling back to Ctrl-C.", e);
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}. The server can only be stopped externally.", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received.");
}

/// Errors after which the listening socket itself cannot accept anymore.
fn is_fatal_accept_error(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        if let Some(code) = e.raw_os_error() {
            return matches!(code, libc::EBADF | libc::EINVAL | libc::ENOTSOCK);
        }
    }
    #[cfg(not(unix))]
    let _ = e;
    false
}
