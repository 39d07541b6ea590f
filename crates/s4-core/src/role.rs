//! Connection role state machine.
//!
//! ```text
//! Unclassified ──telemetry──▶ Producer
//!      │
//!      └────────cmd────────▶ Consumer
//! ```
//!
//! Both classified states are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::MessageKind;

/// Role of a connection in the relay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// No qualifying message seen yet.
    #[default]
    Unclassified,
    /// Emits telemetry (the robot).
    Producer,
    /// Emits commands and observes telemetry (an operator dashboard).
    Consumer,
}

impl Role {
    /// Role implied by a message kind, if any.
    pub fn implied_by(kind: MessageKind) -> Option<Self> {
        match kind {
            MessageKind::Telemetry => Some(Self::Producer),
            MessageKind::Cmd => Some(Self::Consumer),
            _ => None,
        }
    }

    /// Next state after observing `kind`.
    ///
    /// Classified roles never change.
    #[must_use]
    pub fn transition(self, kind: MessageKind) -> Self {
        match self {
            Self::Unclassified => Self::implied_by(kind).unwrap_or(Self::Unclassified),
            classified => classified,
        }
    }

    /// Whether the role has been assigned.
    pub fn is_classified(self) -> bool {
        self != Self::Unclassified
    }

    /// Wire / log name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unclassified => "unclassified",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_classifies_producer() {
        assert_eq!(Role::Unclassified.transition(MessageKind::Telemetry), Role::Producer);
    }

    #[test]
    fn cmd_classifies_consumer() {
        assert_eq!(Role::Unclassified.transition(MessageKind::Cmd), Role::Consumer);
    }

    #[test]
    fn other_kinds_leave_unclassified() {
        for kind in [
            MessageKind::VersionRequest,
            MessageKind::PermissionGranted,
            MessageKind::PermissionDenied,
            MessageKind::ApplyUpdate,
            MessageKind::Config,
        ] {
            assert_eq!(Role::Unclassified.transition(kind), Role::Unclassified);
        }
    }

    #[test]
    fn classified_roles_are_terminal() {
        assert_eq!(Role::Producer.transition(MessageKind::Cmd), Role::Producer);
        assert_eq!(Role::Consumer.transition(MessageKind::Telemetry), Role::Consumer);
    }

    #[test]
    fn default_is_unclassified() {
        assert_eq!(Role::default(), Role::Unclassified);
        assert!(!Role::default().is_classified());
        assert!(Role::Producer.is_classified());
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Consumer).unwrap(), "\"consumer\"");
        assert_eq!(Role::Producer.to_string(), "producer");
    }
}
