//! Per-frame classification and dispatch.

use std::sync::Arc;

use metrics::counter;
use s4_core::protocol::decode;
use s4_core::{Decoded, InboundMessage, MessageKind, OutboundMessage};
use tracing::{info, instrument, warn};

use super::Relay;
use crate::metrics::{RELAY_DECODE_ERRORS_TOTAL, RELAY_MESSAGES_TOTAL, RELAY_UNRECOGNIZED_TOTAL};
use crate::websocket::{ClientConnection, FanOut};

/// What happened to one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A known message was handled.
    Dispatched {
        /// Message kind.
        kind: MessageKind,
        /// Fan-out results; empty for reply-only kinds.
        fan_out: FanOut,
    },
    /// Well-formed, but the relay does not handle this `type`.
    Unrecognized(String),
    /// The frame failed to decode; the sender got an error notice.
    Malformed,
}

impl Relay {
    /// Decode, classify and dispatch one text frame from `sender`.
    ///
    /// Classification only happens after a successful decode, so malformed
    /// and unrecognized frames never change a connection's role.
    #[instrument(skip_all, fields(client_id = %sender.id(), role = %sender.role()))]
    pub async fn handle_frame(&self, sender: &Arc<ClientConnection>, text: &str) -> RouteOutcome {
        let message = match decode(text) {
            Ok(Decoded::Known(message)) => message,
            Ok(Decoded::Unrecognized(kind)) => {
                counter!(RELAY_UNRECOGNIZED_TOTAL).increment(1);
                warn!(kind = %kind, "unrecognized message type");
                return RouteOutcome::Unrecognized(kind);
            }
            Err(e) => {
                counter!(RELAY_DECODE_ERRORS_TOTAL).increment(1);
                warn!(error = %e, "malformed message");
                let _ = sender.send_message(&OutboundMessage::error(format!(
                    "Invalid message format: {e}"
                )));
                return RouteOutcome::Malformed;
            }
        };

        let kind = message.kind();
        if let Some(role) = sender.classify(kind) {
            info!(%role, %kind, "client classified");
        }
        counter!(RELAY_MESSAGES_TOTAL, "type" => kind.as_str()).increment(1);

        let fan_out = match message {
            InboundMessage::Telemetry { telemetry, payload } => {
                self.on_telemetry(sender, telemetry, payload, text).await
            }
            InboundMessage::Command(command) => self.on_command(sender, command, text).await,
            InboundMessage::VersionRequest => {
                self.on_version_request(sender);
                FanOut::default()
            }
            InboundMessage::Permission { granted } => {
                self.on_permission(sender, granted);
                FanOut::default()
            }
            InboundMessage::ApplyUpdate(update) => self.on_apply_update(sender, update).await,
            InboundMessage::Config(_) => self.on_config(sender, text).await,
        };

        RouteOutcome::Dispatched { kind, fan_out }
    }
}
