//! Liveness monitor.
//!
//! One shared timer sweeps every connection. A connection silent for a
//! whole period is evicted; the rest get their flag cleared and a ping.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::connection::ClientId;
use super::registry::ConnectionRegistry;
use crate::metrics::LIVENESS_EVICTIONS_TOTAL;

/// Outcome of one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections that were alive and were pinged.
    pub probed: usize,
    /// Connections terminated and removed.
    pub evicted: Vec<ClientId>,
}

/// Run one liveness sweep.
///
/// Ping failures are ignored; a connection that cannot be pinged will not
/// answer and is evicted on the next sweep.
pub async fn sweep(registry: &ConnectionRegistry) -> SweepReport {
    let mut report = SweepReport::default();
    for connection in registry.snapshot(|_| true).await {
        if connection.check_alive() {
            let _ = connection.ping();
            report.probed += 1;
        } else {
            connection.terminate();
            let _ = registry.unregister(connection.id()).await;
            counter!(LIVENESS_EVICTIONS_TOTAL).increment(1);
            info!(
                client_id = %connection.id(),
                remote_addr = ?connection.remote_addr(),
                role = %connection.role(),
                age_secs = connection.age().as_secs(),
                "terminating unresponsive client"
            );
            report.evicted.push(connection.id());
        }
    }
    report
}

/// Sweep every `period` until `cancel` fires.
///
/// The first sweep happens one full period after start.
pub async fn run_liveness_monitor(
    registry: Arc<ConnectionRegistry>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let _ = interval.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("liveness monitor stopped");
                break;
            }
            _ = interval.tick() => {
                let report = sweep(&registry).await;
                debug!(probed = report.probed, evicted = report.evicted.len(), "liveness sweep");
            }
        }
    }
}
