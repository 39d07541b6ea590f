//! Role-targeted fan-out.

use std::sync::Arc;

use metrics::counter;
use s4_core::Role;
use tracing::{debug, warn};

use super::connection::{ClientId, SendOutcome};
use super::registry::ConnectionRegistry;
use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

/// Per-recipient results of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Recipients whose queue accepted the frame.
    pub delivered: usize,
    /// Recipients whose send failed (full or closed queue).
    pub failed: usize,
}

impl FanOut {
    /// Tally one send.
    pub fn record(&mut self, outcome: SendOutcome) {
        if outcome.is_delivered() {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Recipients attempted.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Send `payload` to every connection in `target` except `sender`.
///
/// Per-recipient failures are counted and never abort the loop.
pub async fn fan_out(
    registry: &ConnectionRegistry,
    sender: ClientId,
    target: Role,
    payload: &Arc<String>,
) -> FanOut {
    let recipients = registry
        .snapshot(|c| c.id() != sender && c.role() == target)
        .await;

    let mut result = FanOut::default();
    for recipient in &recipients {
        let outcome = recipient.send(Arc::clone(payload));
        if !outcome.is_delivered() {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            warn!(
                client_id = %recipient.id(),
                ?outcome,
                drops = recipient.drop_count(),
                "fan-out send failed"
            );
        }
        result.record(outcome);
    }
    debug!(%target, delivered = result.delivered, failed = result.failed, "fan-out complete");
    result
}
