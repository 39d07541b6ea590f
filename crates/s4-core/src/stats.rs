//! Process-lifetime relay counters.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::protocol::Command;
use crate::telemetry::TelemetryRecord;

/// A command as accepted by the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    /// Operator payload.
    #[serde(flatten)]
    pub command: Command,
    /// Relay receipt time (ms since epoch).
    pub received_at: i64,
}

impl CommandRecord {
    /// Stamp a command with its receipt time.
    pub fn new(command: Command, received_at: i64) -> Self {
        Self {
            command,
            received_at,
        }
    }
}

/// Point-in-time view of the counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Telemetry messages accepted.
    pub telemetry_count: u64,
    /// Commands accepted.
    pub command_count: u64,
    /// Most recent telemetry.
    pub last_telemetry: Option<TelemetryRecord>,
    /// Most recent command.
    pub last_command: Option<CommandRecord>,
    /// Seconds since the counters started.
    pub uptime_seconds: f64,
    /// `telemetry_count / uptime_seconds`, or 0 when no time has elapsed.
    pub average_telemetry_rate_per_second: f64,
}

/// Telemetry/command counters with "last seen" records.
#[derive(Debug)]
pub struct StatsAggregator {
    telemetry_count: u64,
    command_count: u64,
    last_telemetry: Option<TelemetryRecord>,
    last_command: Option<CommandRecord>,
    started_at: Instant,
}

impl StatsAggregator {
    /// Start counting from now.
    pub fn new() -> Self {
        Self {
            telemetry_count: 0,
            command_count: 0,
            last_telemetry: None,
            last_command: None,
            started_at: Instant::now(),
        }
    }

    /// Record accepted telemetry. Returns the new telemetry count.
    pub fn on_telemetry(&mut self, record: TelemetryRecord) -> u64 {
        self.telemetry_count += 1;
        self.last_telemetry = Some(record);
        self.telemetry_count
    }

    /// Record an accepted command. Returns the new command count.
    pub fn on_command(&mut self, record: CommandRecord) -> u64 {
        self.command_count += 1;
        self.last_command = Some(record);
        self.command_count
    }

    /// Zero all counters and restart the clock.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Time since the counters started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Snapshot using the real elapsed time.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_with_elapsed(self.elapsed())
    }

    /// Snapshot as if `elapsed` had passed since start.
    pub fn snapshot_with_elapsed(&self, elapsed: Duration) -> StatsSnapshot {
        let uptime_seconds = elapsed.as_secs_f64();
        StatsSnapshot {
            telemetry_count: self.telemetry_count,
            command_count: self.command_count,
            last_telemetry: self.last_telemetry.clone(),
            last_command: self.last_command.clone(),
            uptime_seconds,
            average_telemetry_rate_per_second: average_rate(self.telemetry_count, uptime_seconds),
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Events per second, defined as 0 when no time has elapsed.
#[allow(clippy::cast_precision_loss)]
pub fn average_rate(count: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds > 0.0 {
        count as f64 / elapsed_seconds
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn telemetry(battery: f64) -> TelemetryRecord {
        let payload = json!({
            "type": "telemetry",
            "pose": {"x": 1.0, "y": 2.0, "theta": 0.0},
            "battery": battery,
            "receivedAt": 1,
        });
        TelemetryRecord::try_from(payload.as_object().cloned().unwrap()).unwrap()
    }

    fn command(name: &str) -> CommandRecord {
        CommandRecord::new(
            Command {
                cmd: name.into(),
                extra: Map::new(),
            },
            2,
        )
    }

    #[test]
    fn rate_is_count_over_elapsed() {
        assert!((average_rate(100, 50.0) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rate_is_zero_when_no_time_elapsed() {
        assert!(average_rate(100, 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_rate_with_fixed_elapsed() {
        let mut stats = StatsAggregator::new();
        for _ in 0..100 {
            let _ = stats.on_telemetry(telemetry(80.0));
        }
        let snap = stats.snapshot_with_elapsed(Duration::from_secs(50));
        assert_eq!(snap.telemetry_count, 100);
        assert!((snap.average_telemetry_rate_per_second - 2.0).abs() < f64::EPSILON);

        let at_zero = stats.snapshot_with_elapsed(Duration::ZERO);
        assert!(at_zero.average_telemetry_rate_per_second.abs() < f64::EPSILON);
    }

    #[test]
    fn last_records_are_overwritten() {
        let mut stats = StatsAggregator::new();
        let _ = stats.on_telemetry(telemetry(90.0));
        let _ = stats.on_telemetry(telemetry(89.5));
        assert_eq!(stats.on_command(command("forward")), 1);
        assert_eq!(stats.on_command(command("stop")), 2);

        let snap = stats.snapshot();
        assert_eq!(snap.telemetry_count, 2);
        assert_eq!(snap.command_count, 2);
        assert_eq!(
            snap.last_telemetry.and_then(|r| r.telemetry.battery),
            Some(89.5)
        );
        assert_eq!(snap.last_command.map(|r| r.command.cmd).as_deref(), Some("stop"));
    }

    #[test]
    fn reset_clears_everything() {
        let mut stats = StatsAggregator::new();
        let _ = stats.on_telemetry(telemetry(50.0));
        let _ = stats.on_command(command("left"));
        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.telemetry_count, 0);
        assert_eq!(snap.command_count, 0);
        assert!(snap.last_telemetry.is_none());
        assert!(snap.last_command.is_none());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let mut stats = StatsAggregator::new();
        let _ = stats.on_command(command("right"));
        let v = serde_json::to_value(stats.snapshot_with_elapsed(Duration::from_secs(4))).unwrap();
        assert_eq!(v["commandCount"], 1);
        assert_eq!(v["lastCommand"]["cmd"], "right");
        assert_eq!(v["uptimeSeconds"], 4.0);
        assert!(v["lastTelemetry"].is_null());
        assert!(v.get("averageTelemetryRatePerSecond").is_some());
    }

    #[test]
    fn last_telemetry_serializes_as_sent() {
        let mut stats = StatsAggregator::new();
        let _ = stats.on_telemetry(telemetry(75.0));
        let v = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(v["lastTelemetry"]["type"], "telemetry");
        assert_eq!(v["lastTelemetry"]["battery"], 75.0);
        assert_eq!(v["lastTelemetry"]["receivedAt"], 1);
    }
}
