//! Per-kind message handlers.

use std::sync::Arc;

use s4_core::protocol::{ApplyUpdate, Command, Telemetry};
use s4_core::{CommandRecord, OutboundMessage, Role, TelemetryRecord, now_millis};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::Relay;
use crate::websocket::fanout::fan_out;
use crate::websocket::{ClientConnection, FanOut, SendOutcome};

/// Emit a throughput summary every this many telemetry messages.
const TELEMETRY_SUMMARY_EVERY: u64 = 100;

/// Emit a pose line every this many telemetry messages.
const POSE_LOG_EVERY: u64 = 50;

impl Relay {
    /// Store, count and forward producer telemetry to every consumer.
    pub(super) async fn on_telemetry(
        &self,
        sender: &ClientConnection,
        telemetry: Telemetry,
        payload: Map<String, Value>,
        raw: &str,
    ) -> FanOut {
        let record = TelemetryRecord::new(telemetry, payload, now_millis());
        let _ = self.telemetry.lock().append(record.clone());
        let (count, stats) = {
            let mut aggregator = self.stats.lock();
            let count = aggregator.on_telemetry(record.clone());
            (count, (count % TELEMETRY_SUMMARY_EVERY == 0).then(|| aggregator.snapshot()))
        };

        let payload = Arc::new(raw.to_owned());
        let result = fan_out(&self.registry, sender.id(), Role::Consumer, &payload).await;

        if let Some(stats) = stats {
            info!(
                telemetry_count = count,
                rate_per_sec = stats.average_telemetry_rate_per_second,
                consumers = result.delivered,
                "telemetry summary"
            );
        }
        if count % POSE_LOG_EVERY == 0 {
            let pose = record.telemetry.pose;
            debug!(
                telemetry_count = count,
                x = pose.x,
                y = pose.y,
                theta = pose.theta,
                battery = ?record.telemetry.battery,
                consumers = result.delivered,
                "robot pose"
            );
        }
        result
    }

    /// Count a command, forward it to every producer and acknowledge it.
    pub(super) async fn on_command(
        &self,
        sender: &ClientConnection,
        command: Command,
        raw: &str,
    ) -> FanOut {
        let cmd = command.cmd.clone();
        let count = self
            .stats
            .lock()
            .on_command(CommandRecord::new(command, now_millis()));

        let payload = Arc::new(raw.to_owned());
        let result = fan_out(&self.registry, sender.id(), Role::Producer, &payload).await;
        info!(
            cmd = %cmd,
            command_count = count,
            producers = result.delivered,
            "command forwarded"
        );

        reply(
            sender,
            &OutboundMessage::Ack {
                original_command: cmd,
                forwarded: result.delivered,
            },
        );
        result
    }

    pub(super) fn on_version_request(&self, sender: &ClientConnection) {
        debug!("version requested");
        reply(sender, &OutboundMessage::version_response());
    }

    /// Record the decision for consumers and echo it back.
    ///
    /// The flag is informational; nothing gates on it.
    pub(super) fn on_permission(&self, sender: &ClientConnection, granted: bool) {
        if sender.role() == Role::Consumer {
            sender.set_control_permission(granted);
            info!(granted, "control permission updated");
        } else {
            warn!(granted, role = %sender.role(), "permission change from non-consumer ignored");
        }
        reply(sender, &OutboundMessage::permission_ack(granted));
    }

    /// Push an update notice to every producer and confirm to the requester.
    pub(super) async fn on_apply_update(
        &self,
        sender: &ClientConnection,
        update: ApplyUpdate,
    ) -> FanOut {
        let notice = OutboundMessage::update(update.update_type.clone());
        let result = match notice.to_json() {
            Ok(json) => fan_out(&self.registry, sender.id(), Role::Producer, &Arc::new(json)).await,
            Err(e) => {
                warn!(error = %e, "failed to serialize update notice");
                FanOut::default()
            }
        };
        info!(
            update_type = %update.update_type,
            producers = result.delivered,
            "update requested"
        );
        reply(sender, &OutboundMessage::update_applied(update.update_type));
        result
    }

    /// Forward a config message to every producer and report whether any got it.
    pub(super) async fn on_config(&self, sender: &ClientConnection, raw: &str) -> FanOut {
        let payload = Arc::new(raw.to_owned());
        let result = fan_out(&self.registry, sender.id(), Role::Producer, &payload).await;
        info!(producers = result.delivered, "config forwarded");
        reply(sender, &OutboundMessage::config_ack(result.delivered));
        result
    }
}

fn reply(sender: &ClientConnection, message: &OutboundMessage) {
    let outcome = sender.send_message(message);
    if outcome != SendOutcome::Delivered {
        debug!(kind = message.type_name(), ?outcome, "reply not queued");
    }
}
