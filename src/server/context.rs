// src/server/context.rs

use crate::config::Config;
use crate::core::Registry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub connection_permits: Arc<Semaphore>,
}
