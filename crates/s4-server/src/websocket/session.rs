//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use s4_core::OutboundMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::connection::Outbound;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::relay::Relay;

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection and sends the `connected` notice
/// 2. Routes every text (or UTF-8 binary) frame through the relay
/// 3. Forwards queued frames to the socket from a writer task
/// 4. Unregisters on close, read error, or termination
#[instrument(skip_all, fields(client_id))]
pub async fn run_ws_session(ws: WebSocket, relay: Arc<Relay>, remote_addr: Option<SocketAddr>) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Outbound>(relay.config().outbound_buffer);

    let registry = Arc::clone(relay.registry());
    let connection = registry.register(send_tx, remote_addr).await;
    let client_id = connection.id();
    let _ = tracing::Span::current().record("client_id", tracing::field::display(client_id));

    let connections = registry.count().await;
    info!(?remote_addr, connections, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let _ = connection.send_message(&OutboundMessage::connected(client_id.to_string()));

    let terminated = connection.termination_token();
    let writer = tokio::spawn(write_outbound(ws_tx, send_rx, terminated.clone()));

    loop {
        let frame = tokio::select! {
            () = terminated.cancelled() => {
                debug!("connection terminated");
                break;
            }
            frame = ws_rx.next() => frame,
        };

        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read error");
                break;
            }
            None => break,
        };

        connection.mark_alive();

        match msg {
            Message::Text(text) => {
                let _ = relay.handle_frame(&connection, text.as_str()).await;
            }
            Message::Binary(data) => {
                if let Ok(text) = std::str::from_utf8(&data) {
                    let _ = relay.handle_frame(&connection, text).await;
                } else {
                    debug!(len = data.len(), "received non-UTF8 binary frame");
                    let _ = connection.send_message(&OutboundMessage::error(
                        "Invalid message format: binary frame is not UTF-8",
                    ));
                }
            }
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    let _ = registry.unregister(client_id).await;
    connection.terminate();
    let _ = writer.await;

    let connections = registry.count().await;
    info!(
        role = %connection.role(),
        dropped = connection.drop_count(),
        connections,
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}

/// Drain the outbound queue into the socket until closed or terminated.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    terminated: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            () = terminated.cancelled() => break,
            next = rx.recv() => next,
        };
        let Some(outbound) = next else { break };

        let result = match outbound {
            Outbound::Text(text) => sink.send(Message::Text(text.as_str().into())).await,
            Outbound::Ping => sink.send(Message::Ping(Bytes::new())).await,
            Outbound::Close { code, reason } => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
        };
        if result.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}
