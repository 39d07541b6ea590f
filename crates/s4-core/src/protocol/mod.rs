//! JSON wire protocol.
//!
//! Every frame is a JSON object with a string `type` field. Decoding happens
//! in two steps so the router can tell an unknown-but-well-formed message
//! (logged, otherwise ignored) apart from a malformed one (reported back to
//! the sender):
//!
//! 1. parse the frame and pull out `type`
//! 2. if the type is known, validate the remaining fields against its schema

pub mod inbound;
pub mod outbound;

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

pub use inbound::{ApplyUpdate, Command, ConfigUpdate, InboundMessage, Telemetry};
pub use outbound::{ConfigStatus, OutboundMessage, UpdateStatus, Versions};

/// Message kinds the router dispatches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `telemetry`
    Telemetry,
    /// `cmd`
    Cmd,
    /// `version_request`
    VersionRequest,
    /// `permission_granted`
    PermissionGranted,
    /// `permission_denied`
    PermissionDenied,
    /// `apply_update`
    ApplyUpdate,
    /// `config`
    Config,
}

impl MessageKind {
    /// Look up a kind by its wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "telemetry" => Some(Self::Telemetry),
            "cmd" => Some(Self::Cmd),
            "version_request" => Some(Self::VersionRequest),
            "permission_granted" => Some(Self::PermissionGranted),
            "permission_denied" => Some(Self::PermissionDenied),
            "apply_update" => Some(Self::ApplyUpdate),
            "config" => Some(Self::Config),
            _ => None,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Cmd => "cmd",
            Self::VersionRequest => "version_request",
            Self::PermissionGranted => "permission_granted",
            Self::PermissionDenied => "permission_denied",
            Self::ApplyUpdate => "apply_update",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an inbound frame was rejected.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// The frame is JSON but not an object.
    #[error("message must be a JSON object")]
    NotAnObject,
    /// The object has no string `type` field.
    #[error("message is missing a string `type` field")]
    MissingType,
    /// A known message kind failed schema validation.
    #[error("invalid `{kind}` message: {source}")]
    InvalidFields {
        /// Declared kind.
        kind: MessageKind,
        /// Underlying field error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result of decoding a well-formed frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// A known message that passed validation.
    Known(InboundMessage),
    /// A well-formed object whose `type` the relay does not handle.
    Unrecognized(String),
}

/// Decode one text frame.
pub fn decode(text: &str) -> Result<Decoded, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
    let Value::Object(mut body) = value else {
        return Err(ProtocolError::NotAnObject);
    };
    let type_name = match body.remove("type") {
        Some(Value::String(name)) => name,
        _ => return Err(ProtocolError::MissingType),
    };
    let Some(kind) = MessageKind::parse(&type_name) else {
        return Ok(Decoded::Unrecognized(type_name));
    };

    let message = match kind {
        MessageKind::Telemetry => {
            let mut payload = body.clone();
            let _ = payload.insert("type".into(), Value::String(type_name));
            InboundMessage::Telemetry {
                telemetry: fields(kind, body)?,
                payload,
            }
        }
        MessageKind::Cmd => InboundMessage::Command(fields(kind, body)?),
        MessageKind::VersionRequest => InboundMessage::VersionRequest,
        MessageKind::PermissionGranted => InboundMessage::Permission { granted: true },
        MessageKind::PermissionDenied => InboundMessage::Permission { granted: false },
        MessageKind::ApplyUpdate => InboundMessage::ApplyUpdate(fields(kind, body)?),
        MessageKind::Config => InboundMessage::Config(fields(kind, body)?),
    };
    Ok(Decoded::Known(message))
}

fn fields<T: DeserializeOwned>(kind: MessageKind, body: Map<String, Value>) -> Result<T, ProtocolError> {
    serde_json::from_value(Value::Object(body)).map_err(|source| ProtocolError::InvalidFields { kind, source })
}
