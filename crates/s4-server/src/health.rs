//! `/health` and `/status` response bodies.

use serde::Serialize;
use std::time::Instant;

use crate::relay::RelayStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `true` when the server is running.
    pub healthy: bool,
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize) -> HealthResponse {
    HealthResponse {
        healthy: true,
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}

/// Connected clients broken down by role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientCounts {
    /// All registered connections.
    pub connections: usize,
    /// Connections that have sent telemetry.
    pub producers: usize,
    /// Connections that have sent operator messages.
    pub consumers: usize,
    /// Connections not yet classified.
    pub unclassified: usize,
}

/// `/status` response body: client counts and relay counters in one object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Connected clients.
    #[serde(flatten)]
    pub clients: ClientCounts,
    /// Relay counters.
    #[serde(flatten)]
    pub stats: RelayStats,
}

impl StatusResponse {
    /// Assemble a status body.
    pub fn new(clients: ClientCounts, stats: RelayStats) -> Self {
        Self {
            status: "ok",
            clients,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s4_core::StatsAggregator;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0);
        assert_eq!(resp.status, "ok");
    }

    #[test]
    fn uptime_starts_at_zero() {
        let resp = health_check(Instant::now(), 0);
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, 0);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn health_serializes_to_json() {
        let resp = health_check(Instant::now(), 3);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["healthy"], true);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 3);
        assert!(json["uptimeSecs"].is_u64());
    }

    #[test]
    fn status_serializes_counts_and_stats() {
        let resp = StatusResponse::new(
            ClientCounts {
                connections: 3,
                producers: 1,
                consumers: 1,
                unclassified: 1,
            },
            RelayStats {
                stats: StatsAggregator::new().snapshot(),
                telemetry_history_size: 0,
            },
        );
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 3);
        assert_eq!(json["producers"], 1);
        assert_eq!(json["telemetryCount"], 0);
        assert_eq!(json["telemetryHistorySize"], 0);
        assert!(json["lastTelemetry"].is_null());
    }
}
