//! Messages the relay itself originates.
//!
//! Forwarded traffic never passes through these types; the router relays
//! the sender's original text so payloads stay byte-for-byte intact.

use serde::{Deserialize, Serialize};

use crate::now_millis;

/// Wire protocol version reported in `version_response`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Greeting text carried by the `connected` notice.
pub const WELCOME_MESSAGE: &str = "Connected to S4 Relay";

/// Relay-originated message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    /// Sent once, right after the connection is accepted.
    Connected {
        /// Identifier assigned to the client.
        client_id: String,
        /// Human-readable greeting.
        message: String,
    },
    /// The client's last frame could not be decoded.
    Error {
        /// Description of what was wrong.
        message: String,
    },
    /// Acknowledges a `cmd`.
    Ack {
        /// The command name as sent.
        original_command: String,
        /// Number of producers the command reached.
        forwarded: usize,
    },
    /// Reply to `version_request`.
    VersionResponse {
        /// Version identifiers.
        versions: Versions,
        /// Reply time (ms since epoch).
        timestamp: i64,
    },
    /// Acknowledges `permission_granted` / `permission_denied`.
    PermissionAck {
        /// The permission state that was requested.
        granted: bool,
        /// Reply time (ms since epoch).
        timestamp: i64,
    },
    /// Update notice pushed to producers on `apply_update`.
    Update {
        /// Kind of update.
        update_type: String,
        /// Notice time (ms since epoch).
        timestamp: i64,
    },
    /// Confirms an `apply_update` to the requester.
    UpdateApplied {
        /// Kind of update.
        update_type: String,
        /// Outcome.
        status: UpdateStatus,
        /// Reply time (ms since epoch).
        timestamp: i64,
    },
    /// Acknowledges a `config`.
    ConfigAck {
        /// Whether any producer received it.
        status: ConfigStatus,
        /// Reply time (ms since epoch).
        timestamp: i64,
    },
}

impl OutboundMessage {
    /// Welcome notice for a freshly accepted client.
    pub fn connected(client_id: impl Into<String>) -> Self {
        Self::Connected {
            client_id: client_id.into(),
            message: WELCOME_MESSAGE.to_owned(),
        }
    }

    /// Malformed-message notice.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Version reply stamped with the current time.
    pub fn version_response() -> Self {
        Self::VersionResponse {
            versions: Versions::current(),
            timestamp: now_millis(),
        }
    }

    /// Permission acknowledgment stamped with the current time.
    pub fn permission_ack(granted: bool) -> Self {
        Self::PermissionAck {
            granted,
            timestamp: now_millis(),
        }
    }

    /// Update notice for producers.
    pub fn update(update_type: impl Into<String>) -> Self {
        Self::Update {
            update_type: update_type.into(),
            timestamp: now_millis(),
        }
    }

    /// Successful update confirmation for the requester.
    pub fn update_applied(update_type: impl Into<String>) -> Self {
        Self::UpdateApplied {
            update_type: update_type.into(),
            status: UpdateStatus::Success,
            timestamp: now_millis(),
        }
    }

    /// Config acknowledgment derived from how many producers were reached.
    pub fn config_ack(delivered_to: usize) -> Self {
        let status = if delivered_to > 0 {
            ConfigStatus::Delivered
        } else {
            ConfigStatus::NoRobot
        };
        Self::ConfigAck {
            status,
            timestamp: now_millis(),
        }
    }

    /// Wire `type` tag of this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Error { .. } => "error",
            Self::Ack { .. } => "ack",
            Self::VersionResponse { .. } => "version_response",
            Self::PermissionAck { .. } => "permission_ack",
            Self::Update { .. } => "update",
            Self::UpdateApplied { .. } => "update_applied",
            Self::ConfigAck { .. } => "config_ack",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Static version identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versions {
    /// Relay crate version.
    pub backend: String,
    /// Wire protocol version.
    pub protocol: String,
    /// Minimum supported Rust toolchain the relay was built for.
    pub rust: String,
}

impl Versions {
    /// Versions of this build.
    pub fn current() -> Self {
        Self {
            backend: env!("CARGO_PKG_VERSION").to_owned(),
            protocol: PROTOCOL_VERSION.to_owned(),
            rust: env!("CARGO_PKG_RUST_VERSION").to_owned(),
        }
    }
}

/// Outcome reported by `update_applied`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// The update notice was issued.
    Success,
}

/// Outcome reported by `config_ack`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStatus {
    /// At least one producer received the config.
    Delivered,
    /// No producer was connected.
    NoRobot,
}
