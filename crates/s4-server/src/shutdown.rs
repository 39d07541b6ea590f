//! Relay shutdown sequence.
//!
//! Clients get a normal close frame first and a short grace period to
//! leave. Only then is the root token cancelled, which terminates any
//! connection still open and stops the listener and the liveness monitor.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::relay::Relay;
use crate::websocket::ConnectionRegistry;

/// How long clients get to leave after the close frame.
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on joining background tasks when the caller gives none.
const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the grace wait re-checks the registry.
const DRAIN_POLL: Duration = Duration::from_millis(25);

/// What a shutdown run did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Clients a close frame was queued to.
    pub closed: usize,
    /// Clients still registered when the grace period ran out.
    pub lingering: usize,
    /// Whether joining background tasks hit the timeout.
    pub timed_out: bool,
}

/// Owns the root cancellation token and runs the shutdown sequence.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    close_grace: Duration,
}

impl ShutdownCoordinator {
    /// Coordinator with the default close grace.
    pub fn new() -> Self {
        Self::with_close_grace(CLOSE_GRACE)
    }

    /// Use a custom grace period between the close frame and cancellation.
    pub fn with_close_grace(close_grace: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            close_grace,
        }
    }

    /// Root token; connection tokens and background tasks hang off it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel immediately, skipping the close handshake.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the root token has been cancelled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Close every client, wait out the grace period, cancel, then join
    /// `handles` for at most `timeout`.
    pub async fn shutdown(
        &self,
        relay: &Relay,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> ShutdownReport {
        let closed = relay.close_all().await;
        let lingering = wait_for_clients(relay.registry(), self.close_grace).await;
        self.cancel();

        let timeout = timeout.unwrap_or(DEFAULT_TASK_TIMEOUT);
        info!(
            closed,
            lingering,
            tasks = handles.len(),
            "relay cancelled, joining background tasks"
        );
        let timed_out = tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err();
        if timed_out {
            warn!(?timeout, "background tasks still running after shutdown timeout");
        }

        ShutdownReport {
            closed,
            lingering,
            timed_out,
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll until the registry is empty or `grace` elapses. Returns the number
/// of connections left.
async fn wait_for_clients(registry: &ConnectionRegistry, grace: Duration) -> usize {
    let deadline = Instant::now() + grace;
    loop {
        let remaining = registry.count().await;
        if remaining == 0 {
            return 0;
        }
        if Instant::now() >= deadline {
            warn!(remaining, "connections still open after close grace period");
            return remaining;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
}
