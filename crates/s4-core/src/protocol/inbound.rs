//! Inbound message payloads.
//!
//! Each struct is the body of one message kind with the `type` tag already
//! stripped. Fields the relay does not interpret land in `extra`; telemetry
//! additionally carries the untouched object for storage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::MessageKind;
use crate::kinematics::Pose;

/// A decoded, validated inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// Producer state report.
    Telemetry {
        /// Validated fields.
        telemetry: Telemetry,
        /// The whole object as received, `type` included.
        payload: Map<String, Value>,
    },
    /// Movement command from an operator.
    Command(Command),
    /// Request for the relay's version identifiers.
    VersionRequest,
    /// Operator grants (`true`) or revokes (`false`) control permission.
    Permission {
        /// Whether permission was granted.
        granted: bool,
    },
    /// Request to push an update notice to the robot.
    ApplyUpdate(ApplyUpdate),
    /// Configuration to forward to the robot.
    Config(ConfigUpdate),
}

impl InboundMessage {
    /// The declared kind this message was decoded from.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Telemetry { .. } => MessageKind::Telemetry,
            Self::Command(_) => MessageKind::Cmd,
            Self::VersionRequest => MessageKind::VersionRequest,
            Self::Permission { granted: true } => MessageKind::PermissionGranted,
            Self::Permission { granted: false } => MessageKind::PermissionDenied,
            Self::ApplyUpdate(_) => MessageKind::ApplyUpdate,
            Self::Config(_) => MessageKind::Config,
        }
    }
}

/// Robot self-reported state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    /// Position and heading.
    pub pose: Pose,
    /// Current speed in m/s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Battery level in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
    /// Monotonic control-loop cycle counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<u64>,
    /// Robot-side timestamp (ms since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Any other fields the robot included.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Movement command (`forward`, `backward`, `left`, `right`, `stop`, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command name.
    pub cmd: String,
    /// Any other fields the operator included.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Update request; only the update kind is relayed onward.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyUpdate {
    /// Kind of update to apply (e.g. `firmware`, `map`).
    pub update_type: String,
}

/// Free-form configuration forwarded to the robot untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    /// Configuration fields.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}
