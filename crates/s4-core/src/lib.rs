//! # s4-core
//!
//! Foundation types for the S4 robot relay.
//!
//! - [`protocol`]: typed inbound/outbound message schemas and boundary decoding
//! - [`role`]: the per-connection `Unclassified → Producer | Consumer` state machine
//! - [`telemetry`]: fixed-capacity FIFO of recent telemetry records
//! - [`stats`]: process-lifetime counters and rate computation
//! - [`kinematics`]: robot-relative pose arithmetic used by movement clients
//!
//! Nothing in this crate does I/O or locking; the server crate wraps these
//! types in its own synchronization.

#![deny(unsafe_code)]

pub mod kinematics;
pub mod protocol;
pub mod role;
pub mod stats;
pub mod telemetry;

pub use protocol::{Decoded, InboundMessage, MessageKind, OutboundMessage, ProtocolError};
pub use role::Role;
pub use stats::{CommandRecord, StatsAggregator, StatsSnapshot};
pub use telemetry::{TelemetryRecord, TelemetryStore};

/// Milliseconds since the Unix epoch, the timestamp unit used on the wire.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
