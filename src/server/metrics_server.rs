// src/server/metrics_server.rs

//! The optional Prometheus scrape endpoint.

use crate::core::Registry;
use crate::core::metrics::{CONNECTED_CLIENTS, gather_metrics};
use anyhow::{Context, Result};
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// `GET /metrics`. The client gauge is read from the registry on every scrape
/// rather than tracked incrementally.
async fn scrape(registry: Arc<Registry>) -> impl IntoResponse {
    CONNECTED_CLIENTS.set(registry.len() as f64);
    (
        StatusCode::OK,
        [("content-type", PROMETHEUS_CONTENT_TYPE)],
        gather_metrics(),
    )
}

/// Serves `/metrics` on all interfaces until the shutdown signal fires.
pub async fn run_metrics_server(
    registry: Arc<Registry>,
    port: u16,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let app = Router::new().route("/metrics", get(move || scrape(registry.clone())));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Cannot bind the metrics endpoint on {addr}"))?;
    info!("Metrics available at http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Metrics endpoint stopping.");
        })
        .await
        .context("Metrics endpoint failed")
}
