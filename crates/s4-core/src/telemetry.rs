//! Rolling telemetry history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::Telemetry;

/// Default number of records kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Key the relay stamps onto every stored record.
const RECEIVED_AT: &str = "receivedAt";

/// A telemetry message as accepted by the relay.
///
/// Serializes as the producer's original object plus `receivedAt`, so
/// fields the relay does not model and integer-valued numbers come back out
/// unchanged. `telemetry` is the validated view of the same payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct TelemetryRecord {
    /// Validated fields.
    #[serde(skip)]
    pub telemetry: Telemetry,
    /// The object as the producer sent it.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
    /// Relay receipt time (ms since epoch).
    #[serde(rename = "receivedAt")]
    pub received_at: i64,
}

impl TelemetryRecord {
    /// Stamp a decoded payload with its receipt time.
    ///
    /// A `receivedAt` already present in `payload` is replaced.
    pub fn new(telemetry: Telemetry, mut payload: Map<String, Value>, received_at: i64) -> Self {
        let _ = payload.remove(RECEIVED_AT);
        Self {
            telemetry,
            payload,
            received_at,
        }
    }
}

impl TryFrom<Map<String, Value>> for TelemetryRecord {
    type Error = serde_json::Error;

    fn try_from(mut payload: Map<String, Value>) -> Result<Self, Self::Error> {
        let received_at = payload
            .remove(RECEIVED_AT)
            .map(serde_json::from_value::<i64>)
            .transpose()?
            .unwrap_or_default();
        let telemetry = serde_json::from_value(Value::Object(payload.clone()))?;
        Ok(Self::new(telemetry, payload, received_at))
    }
}

/// Fixed-capacity, arrival-ordered telemetry buffer.
///
/// Appending beyond capacity evicts the oldest record. Stored records are
/// never modified.
#[derive(Debug)]
pub struct TelemetryStore {
    records: VecDeque<TelemetryRecord>,
    capacity: usize,
}

impl TelemetryStore {
    /// Create an empty store holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Append a record, evicting the oldest if full.
    ///
    /// Returns the evicted record, if any.
    pub fn append(&mut self, record: TelemetryRecord) -> Option<TelemetryRecord> {
        if self.capacity == 0 {
            return Some(record);
        }
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    /// The last `min(n, len)` records, oldest first.
    pub fn recent_window(&self, n: usize) -> Vec<TelemetryRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).cloned().collect()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all records, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let n = self.records.len();
        self.records.clear();
        n
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
