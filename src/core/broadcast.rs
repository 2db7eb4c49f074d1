// src/core/broadcast.rs

//! Fan-out of one message to every registered connection but its sender.

use crate::connection::ConnectionId;
use crate::core::metrics;
use crate::core::registry::Registry;
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// The outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the message was written to.
    pub delivered: usize,
    /// Peers whose send failed; each of them has been evicted and closed.
    pub failed: usize,
}

/// Delivers messages to the members of a `Registry`.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Sends `message` to every registered connection except `excluding`.
    ///
    /// Works on a snapshot of the registry, so connections joining during the
    /// fan-out do not get the message. Targets are written to concurrently, each
    /// bounded by its own send timeout. A failed target is removed from the
    /// registry and closed; the remaining targets are unaffected.
    pub async fn broadcast(&self, message: &Bytes, excluding: Option<ConnectionId>) -> BroadcastReport {
        let started = Instant::now();
        let targets: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|conn| Some(conn.id()) != excluding)
            .collect();

        let results = join_all(targets.iter().map(|conn| conn.send(message))).await;

        let mut report = BroadcastReport::default();
        let mut evicted = Vec::new();
        for (conn, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    if e.is_normal_disconnect() {
                        debug!("Delivery to {} ({}) failed: {}", conn.addr(), conn.id(), e);
                    } else {
                        warn!("Delivery to {} ({}) failed: {}", conn.addr(), conn.id(), e);
                    }
                    let remaining = self.registry.remove(conn.id());
                    debug!(
                        "Evicted {} after failed delivery. Active connections: {}",
                        conn.addr(),
                        remaining
                    );
                    evicted.push(conn);
                }
            }
        }
        join_all(evicted.into_iter().map(|conn| conn.close())).await;

        metrics::DELIVERIES_TOTAL.inc_by(report.delivered as f64);
        metrics::DELIVERY_FAILURES_TOTAL.inc_by(report.failed as f64);
        metrics::BROADCAST_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());
        report
    }
}
