//! Per-client connection state.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use s4_core::{MessageKind, OutboundMessage, Role};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Close code sent on graceful server shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Monotonic connection identifier, rendered as `client_<n>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Wrap a raw sequence number.
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Raw sequence number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client_{}", self.0)
    }
}

/// Frame queued for a client's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// JSON text frame, shared across fan-out recipients.
    Text(Arc<String>),
    /// Liveness probe.
    Ping,
    /// Close the socket after sending a close frame.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: &'static str,
    },
}

/// Result of a non-blocking enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the writer task.
    Delivered,
    /// The client's queue is full; the frame was dropped.
    Full,
    /// The writer task is gone.
    Closed,
    /// The message could not be serialized.
    EncodeFailed,
}

impl SendOutcome {
    /// Whether the frame was queued.
    pub fn is_delivered(self) -> bool {
        self == Self::Delivered
    }
}

/// A connected WebSocket client.
pub struct ClientConnection {
    id: ClientId,
    role: OnceLock<Role>,
    tx: mpsc::Sender<Outbound>,
    remote_addr: Option<SocketAddr>,
    connected_at: Instant,
    is_alive: AtomicBool,
    has_control_permission: AtomicBool,
    dropped_messages: AtomicU64,
    terminate: CancellationToken,
}

impl ClientConnection {
    /// Create a connection. `terminate` is cancelled to force-close the transport.
    pub fn new(
        id: ClientId,
        tx: mpsc::Sender<Outbound>,
        remote_addr: Option<SocketAddr>,
        terminate: CancellationToken,
    ) -> Self {
        Self {
            id,
            role: OnceLock::new(),
            tx,
            remote_addr,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            has_control_permission: AtomicBool::new(false),
            dropped_messages: AtomicU64::new(0),
            terminate,
        }
    }

    /// Connection identifier.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Peer address, when known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Current role.
    pub fn role(&self) -> Role {
        self.role.get().copied().unwrap_or_default()
    }

    /// Advance the role state machine for a decoded message of `kind`.
    ///
    /// Returns the new role only when this call classified the connection.
    pub fn classify(&self, kind: MessageKind) -> Option<Role> {
        let next = self.role().transition(kind);
        if next.is_classified() && self.role.set(next).is_ok() {
            Some(next)
        } else {
            None
        }
    }

    /// Queue a text frame without waiting.
    pub fn send(&self, text: Arc<String>) -> SendOutcome {
        self.enqueue(Outbound::Text(text))
    }

    /// Serialize and queue a relay-originated message.
    pub fn send_message(&self, message: &OutboundMessage) -> SendOutcome {
        match message.to_json() {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                tracing::error!(client_id = %self.id, error = %e, "failed to serialize outbound message");
                SendOutcome::EncodeFailed
            }
        }
    }

    /// Queue a ping frame.
    pub fn ping(&self) -> SendOutcome {
        self.enqueue(Outbound::Ping)
    }

    /// Queue a graceful close frame.
    pub fn close(&self, reason: &'static str) -> SendOutcome {
        self.enqueue(Outbound::Close {
            code: CLOSE_NORMAL,
            reason,
        })
    }

    fn enqueue(&self, frame: Outbound) -> SendOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Delivered,
            Err(e) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                match e {
                    TrySendError::Full(_) => SendOutcome::Full,
                    TrySendError::Closed(_) => SendOutcome::Closed,
                }
            }
        }
    }

    /// Frames dropped because the queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound traffic.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Read and clear the liveness flag.
    ///
    /// Returns `true` if there was traffic since the previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Current liveness flag without clearing it.
    pub fn is_alive(&self) -> bool {
        self.is_alive.load(Ordering::Relaxed)
    }

    /// Record an operator's control-permission decision.
    pub fn set_control_permission(&self, granted: bool) {
        self.has_control_permission.store(granted, Ordering::Relaxed);
    }

    /// Last recorded control-permission decision.
    pub fn has_control_permission(&self) -> bool {
        self.has_control_permission.load(Ordering::Relaxed)
    }

    /// Force-close the transport.
    pub fn terminate(&self) {
        self.terminate.cancel();
    }

    /// Whether [`terminate`](Self::terminate) was called (or the server is stopping).
    pub fn is_terminated(&self) -> bool {
        self.terminate.is_cancelled()
    }

    /// Token cancelled when the transport must be torn down.
    pub fn termination_token(&self) -> CancellationToken {
        self.terminate.clone()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("role", &self.role())
            .field("remote_addr", &self.remote_addr)
            .field("is_alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new(ClientId::new(1), tx, None, CancellationToken::new());
        (conn, rx)
    }

    #[test]
    fn id_displays_as_client_n() {
        assert_eq!(ClientId::new(42).to_string(), "client_42");
        assert!(ClientId::new(1) < ClientId::new(2));
    }

    #[test]
    fn new_connection_is_alive_and_unclassified() {
        let (conn, _rx) = make_connection(4);
        assert_eq!(conn.id().get(), 1);
        assert_eq!(conn.role(), Role::Unclassified);
        assert!(conn.is_alive());
        assert!(!conn.has_control_permission());
        assert!(!conn.is_terminated());
    }

    #[test]
    fn first_qualifying_message_classifies() {
        let (conn, _rx) = make_connection(4);
        assert_eq!(conn.classify(MessageKind::VersionRequest), None);
        assert_eq!(conn.role(), Role::Unclassified);
        assert_eq!(conn.classify(MessageKind::Telemetry), Some(Role::Producer));
        assert_eq!(conn.role(), Role::Producer);
    }

    #[test]
    fn classification_is_sticky() {
        let (conn, _rx) = make_connection(4);
        assert_eq!(conn.classify(MessageKind::Cmd), Some(Role::Consumer));
        assert_eq!(conn.classify(MessageKind::Telemetry), None);
        assert_eq!(conn.classify(MessageKind::Cmd), None);
        assert_eq!(conn.role(), Role::Consumer);
    }

    #[tokio::test]
    async fn send_queues_text() {
        let (conn, mut rx) = make_connection(4);
        assert_eq!(conn.send(Arc::new("hello".into())), SendOutcome::Delivered);
        assert_eq!(rx.recv().await, Some(Outbound::Text(Arc::new("hello".into()))));
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.send(Arc::new("a".into())).is_delivered());
        assert_eq!(conn.send(Arc::new("b".into())), SendOutcome::Full);
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn closed_queue_reports_closed() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert_eq!(conn.ping(), SendOutcome::Closed);
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_message_serializes() {
        let (conn, mut rx) = make_connection(4);
        assert!(conn.send_message(&OutboundMessage::error("nope")).is_delivered());
        let Some(Outbound::Text(text)) = rx.recv().await else {
            panic!("expected text frame");
        };
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["message"], "nope");
    }

    #[tokio::test]
    async fn close_queues_close_frame() {
        let (conn, mut rx) = make_connection(4);
        assert!(conn.close("bye").is_delivered());
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Close {
                code: CLOSE_NORMAL,
                reason: "bye"
            })
        );
    }

    #[test]
    fn check_alive_reads_and_clears() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn permission_flag_is_recorded() {
        let (conn, _rx) = make_connection(4);
        conn.set_control_permission(true);
        assert!(conn.has_control_permission());
        conn.set_control_permission(false);
        assert!(!conn.has_control_permission());
    }

    #[test]
    fn terminate_cancels_token() {
        let (conn, _rx) = make_connection(4);
        let token = conn.termination_token();
        conn.terminate();
        assert!(token.is_cancelled());
        assert!(conn.is_terminated());
    }
}
