// src/server/mod.rs

//! The listener: binds the endpoint, accepts connections and owns every
//! connection handler task until shutdown.

use crate::config::Config;
use crate::core::Registry;
use anyhow::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;

pub use connection_loop::shutdown_signal;

/// A bound, not yet running relay server.
pub struct Server {
    ctx: context::ServerContext,
}

impl Server {
    /// Binds the listening endpoint and spawns the background tasks.
    /// Fails with a bind error if the endpoint cannot be set up.
    pub async fn bind(config: Config) -> Result<Self> {
        let mut ctx = initialization::setup(config).await?;
        spawner::spawn_all(&mut ctx)?;
        Ok(Self { ctx })
    }

    /// The address the server actually listens on (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.ctx.listener.local_addr()?)
    }

    /// The live connection registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.ctx.registry.clone()
    }

    /// Accepts connections until `shutdown` resolves, then closes the listener
    /// and every live connection.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        connection_loop::run(self.ctx, shutdown).await;
    }
}

/// The main server startup function: binds, then serves until SIGINT/SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let server = Server::bind(config).await?;
    server.run_until(shutdown_signal()).await;
    Ok(())
}
