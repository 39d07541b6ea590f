//! The relay service: shared state behind every WebSocket session and HTTP
//! route.

mod handlers;
pub mod router;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use s4_core::{StatsAggregator, StatsSnapshot, TelemetryRecord, TelemetryStore};
use s4_settings::RelaySettings;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use router::RouteOutcome;

use crate::websocket::ConnectionRegistry;
use crate::websocket::heartbeat::run_liveness_monitor;

/// Reason sent with the close frame on shutdown.
pub const SHUTDOWN_REASON: &str = "Server shutting down";

/// Relay engine tuning.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Liveness sweep period.
    pub heartbeat_interval: Duration,
    /// Telemetry records kept in memory.
    pub history_capacity: usize,
    /// Records returned by the history endpoint when no usable limit is given.
    pub default_history_limit: usize,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from(&RelaySettings::default())
    }
}

impl From<&RelaySettings> for RelayConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            heartbeat_interval: settings.relay.heartbeat_interval(),
            history_capacity: settings.relay.history_capacity,
            default_history_limit: settings.relay.default_history_limit,
            outbound_buffer: settings.server.outbound_buffer,
        }
    }
}

/// Counters plus the current history size.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    /// Aggregated counters.
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    /// Records currently held in the telemetry history.
    pub telemetry_history_size: usize,
}

/// Registry, telemetry history and counters shared by all connections.
///
/// Lock order is history then stats; neither is held across an await.
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    telemetry: Mutex<TelemetryStore>,
    stats: Mutex<StatsAggregator>,
    config: RelayConfig,
}

impl Relay {
    /// Create a relay with a standalone registry.
    pub fn new(config: RelayConfig) -> Self {
        Self::with_registry(config, Arc::new(ConnectionRegistry::new()))
    }

    /// Create a relay around an existing registry.
    pub fn with_registry(config: RelayConfig, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            telemetry: Mutex::new(TelemetryStore::new(config.history_capacity)),
            stats: Mutex::new(StatsAggregator::new()),
            config,
        }
    }

    /// Connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Engine tuning.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Up to `limit` most recent telemetry records, oldest first.
    pub fn recent_telemetry(&self, limit: usize) -> Vec<TelemetryRecord> {
        self.telemetry.lock().recent_window(limit)
    }

    /// Records currently held in the telemetry history.
    pub fn history_len(&self) -> usize {
        self.telemetry.lock().len()
    }

    /// Current counters.
    pub fn stats(&self) -> RelayStats {
        let telemetry_history_size = self.history_len();
        RelayStats {
            stats: self.stats.lock().snapshot(),
            telemetry_history_size,
        }
    }

    /// Drop all stored telemetry. Returns how many records were removed.
    pub fn clear_history(&self) -> usize {
        let removed = self.telemetry.lock().clear();
        info!(removed, "telemetry history cleared");
        removed
    }

    /// Zero the counters and restart the uptime clock.
    pub fn reset_stats(&self) {
        self.stats.lock().reset();
        info!("statistics reset");
    }

    /// Queue a close frame to every client. Returns how many were queued.
    pub async fn close_all(&self) -> usize {
        let queued = self.registry.close_all(SHUTDOWN_REASON).await;
        info!(queued, "closing all client connections");
        queued
    }

    /// Spawn the shared liveness timer. It stops when `cancel` fires.
    pub fn spawn_liveness_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(run_liveness_monitor(
            Arc::clone(&self.registry),
            self.config.heartbeat_interval,
            cancel,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(x: f64) -> TelemetryRecord {
        let payload = json!({"type": "telemetry", "pose": {"x": x, "y": 0.0, "theta": 0.0}});
        TelemetryRecord::try_from(payload.as_object().cloned().unwrap()).unwrap()
    }

    #[test]
    fn config_from_settings() {
        let mut settings = RelaySettings::default();
        settings.relay.history_capacity = 5;
        settings.server.outbound_buffer = 16;
        let config = RelayConfig::from(&settings);
        assert_eq!(config.history_capacity, 5);
        assert_eq!(config.outbound_buffer, 16);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.default_history_limit, 100);
    }

    #[test]
    fn stats_include_history_size() {
        let relay = Relay::new(RelayConfig::default());
        let _ = relay.telemetry.lock().append(record(1.0));
        let stats = relay.stats();
        assert_eq!(stats.telemetry_history_size, 1);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["telemetryHistorySize"], 1);
        assert_eq!(json["telemetryCount"], 0);
    }

    #[test]
    fn clear_history_empties_store() {
        let relay = Relay::new(RelayConfig::default());
        let _ = relay.telemetry.lock().append(record(1.0));
        let _ = relay.telemetry.lock().append(record(2.0));
        assert_eq!(relay.clear_history(), 2);
        assert!(relay.recent_telemetry(10).is_empty());
    }

    #[test]
    fn reset_stats_zeroes_counters() {
        let relay = Relay::new(RelayConfig::default());
        let _ = relay.stats.lock().on_telemetry(record(1.0));
        relay.reset_stats();
        let stats = relay.stats().stats;
        assert_eq!(stats.telemetry_count, 0);
        assert!(stats.last_telemetry.is_none());
    }

    #[test]
    fn history_respects_capacity() {
        let relay = Relay::new(RelayConfig {
            history_capacity: 2,
            ..RelayConfig::default()
        });
        for x in [1.0, 2.0, 3.0] {
            let _ = relay.telemetry.lock().append(record(x));
        }
        let xs: Vec<f64> = relay
            .recent_telemetry(10)
            .iter()
            .map(|r| r.telemetry.pose.x)
            .collect();
        assert_eq!(xs, vec![2.0, 3.0]);
    }
}
