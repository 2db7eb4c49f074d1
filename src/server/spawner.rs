// src/server/spawner.rs

//! Spawns the server's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use anyhow::Result;
use tracing::info;

/// Spawns all background tasks into the context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    // --- Metrics Server ---
    if ctx.config.metrics.enabled {
        let registry = ctx.registry.clone();
        let port = ctx.config.metrics.port;
        let shutdown_rx_metrics = ctx.shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            metrics_server::run_metrics_server(registry, port, shutdown_rx_metrics).await
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    Ok(())
}
