// src/core/metrics.rs

//! Defines and registers Prometheus metrics for relay monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, TextEncoder, register_counter, register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// The number of connections currently in the registry. Refreshed on every scrape.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("chatrelay_connected_clients", "Number of currently connected clients.").unwrap();

    // --- Counters ---
    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("chatrelay_connections_received_total", "Total number of connections received.").unwrap();
    /// Connections turned away because `max_clients` was reached.
    pub static ref REJECTED_CONNECTIONS_TOTAL: Counter =
        register_counter!("chatrelay_rejected_connections_total", "Total number of connections rejected at capacity.").unwrap();
    /// User messages received for relaying.
    pub static ref MESSAGES_RECEIVED_TOTAL: Counter =
        register_counter!("chatrelay_messages_received_total", "Total number of user messages received.").unwrap();
    /// Successful per-peer deliveries, notices included.
    pub static ref DELIVERIES_TOTAL: Counter =
        register_counter!("chatrelay_deliveries_total", "Total number of successful per-peer deliveries.").unwrap();
    /// Per-peer deliveries that failed and evicted their target.
    pub static ref DELIVERY_FAILURES_TOTAL: Counter =
        register_counter!("chatrelay_delivery_failures_total", "Total number of failed per-peer deliveries.").unwrap();

    // --- Histograms ---
    /// How long one complete fan-out takes.
    pub static ref BROADCAST_LATENCY_SECONDS: Histogram =
        register_histogram!("chatrelay_broadcast_latency_seconds", "Latency of a complete broadcast fan-out in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
