//! Registry of live connections.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use s4_core::Role;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connection::{ClientConnection, ClientId, Outbound};

/// Connections keyed by id.
///
/// Every connection's termination token is a child of the registry's root
/// token, so cancelling the root tears down every transport at once.
pub struct ConnectionRegistry {
    connections: RwLock<BTreeMap<ClientId, Arc<ClientConnection>>>,
    next_id: AtomicU64,
    root: CancellationToken,
}

impl ConnectionRegistry {
    /// Create an empty registry with its own root token.
    pub fn new() -> Self {
        Self::with_root(CancellationToken::new())
    }

    /// Create an empty registry whose connections are cancelled with `root`.
    pub fn with_root(root: CancellationToken) -> Self {
        Self {
            connections: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
            root,
        }
    }

    /// Allocate an id and add a new, unclassified, alive connection.
    pub async fn register(
        &self,
        tx: mpsc::Sender<Outbound>,
        remote_addr: Option<SocketAddr>,
    ) -> Arc<ClientConnection> {
        let id = ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let connection = Arc::new(ClientConnection::new(
            id,
            tx,
            remote_addr,
            self.root.child_token(),
        ));
        let _ = self
            .connections
            .write()
            .await
            .insert(id, Arc::clone(&connection));
        debug!(client_id = %id, "connection registered");
        connection
    }

    /// Look up a connection.
    pub async fn lookup(&self, id: ClientId) -> Option<Arc<ClientConnection>> {
        self.connections.read().await.get(&id).cloned()
    }

    /// Remove a connection. Removing an absent id is a no-op.
    pub async fn unregister(&self, id: ClientId) -> Option<Arc<ClientConnection>> {
        let removed = self.connections.write().await.remove(&id);
        if removed.is_some() {
            debug!(client_id = %id, "connection unregistered");
        }
        removed
    }

    /// Consistent copy of the connections matching `filter`.
    ///
    /// The lock is released before the caller sends anything.
    pub async fn snapshot<F>(&self, filter: F) -> Vec<Arc<ClientConnection>>
    where
        F: Fn(&ClientConnection) -> bool,
    {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| filter(c))
            .cloned()
            .collect()
    }

    /// Apply `action` to every connection matching `filter`.
    ///
    /// Returns how many connections were visited.
    pub async fn for_each<F, A>(&self, filter: F, mut action: A) -> usize
    where
        F: Fn(&ClientConnection) -> bool,
        A: FnMut(&Arc<ClientConnection>),
    {
        let targets = self.snapshot(filter).await;
        for connection in &targets {
            action(connection);
        }
        targets.len()
    }

    /// Number of registered connections.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of registered connections currently in `role`.
    pub async fn count_by_role(&self, role: Role) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.role() == role)
            .count()
    }

    /// Queue a graceful close on every connection.
    ///
    /// Returns how many close frames were queued.
    pub async fn close_all(&self, reason: &'static str) -> usize {
        let mut queued = 0;
        let _ = self
            .for_each(
                |_| true,
                |c| {
                    if c.close(reason).is_delivered() {
                        queued += 1;
                    }
                },
            )
            .await;
        queued
    }

    /// Root token shared by all connections.
    pub fn root_token(&self) -> &CancellationToken {
        &self.root
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s4_core::MessageKind;

    async fn register(
        registry: &ConnectionRegistry,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        (registry.register(tx, None).await, rx)
    }

    #[tokio::test]
    async fn ids_are_sequential_from_one() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = register(&registry).await;
        let (b, _rb) = register(&registry).await;
        assert_eq!(a.id().to_string(), "client_1");
        assert_eq!(b.id().to_string(), "client_2");
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn ids_are_not_reused() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = register(&registry).await;
        let _ = registry.unregister(a.id()).await;
        let (b, _rb) = register(&registry).await;
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn lookup_finds_registered() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = register(&registry).await;
        let found = registry.lookup(a.id()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &found));
        assert!(registry.lookup(ClientId::new(99)).await.is_none());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = register(&registry).await;
        assert!(registry.unregister(a.id()).await.is_some());
        assert!(registry.unregister(a.id()).await.is_none());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn snapshot_filters_by_role() {
        let registry = ConnectionRegistry::new();
        let (robot, _r1) = register(&registry).await;
        let (op, _r2) = register(&registry).await;
        let (_idle, _r3) = register(&registry).await;
        let _ = robot.classify(MessageKind::Telemetry);
        let _ = op.classify(MessageKind::Cmd);

        let consumers = registry.snapshot(|c| c.role() == Role::Consumer).await;
        assert_eq!(consumers.len(), 1);
        assert_eq!(consumers[0].id(), op.id());
        assert_eq!(registry.count_by_role(Role::Producer).await, 1);
        assert_eq!(registry.count_by_role(Role::Unclassified).await, 1);
    }

    #[tokio::test]
    async fn for_each_visits_matches() {
        let registry = ConnectionRegistry::new();
        let (_a, _ra) = register(&registry).await;
        let (_b, _rb) = register(&registry).await;
        let mut seen = Vec::new();
        let visited = registry.for_each(|_| true, |c| seen.push(c.id())).await;
        assert_eq!(visited, 2);
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn close_all_queues_close_frames() {
        let registry = ConnectionRegistry::new();
        let (_a, mut ra) = register(&registry).await;
        let (_b, mut rb) = register(&registry).await;
        assert_eq!(registry.close_all("Server shutting down").await, 2);
        for rx in [&mut ra, &mut rb] {
            assert_eq!(
                rx.recv().await,
                Some(Outbound::Close {
                    code: 1000,
                    reason: "Server shutting down"
                })
            );
        }
    }

    #[tokio::test]
    async fn root_cancel_terminates_connections() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = register(&registry).await;
        registry.root_token().cancel();
        assert!(a.is_terminated());
    }

    #[tokio::test]
    async fn terminating_one_leaves_others() {
        let registry = ConnectionRegistry::new();
        let (a, _ra) = register(&registry).await;
        let (b, _rb) = register(&registry).await;
        a.terminate();
        assert!(a.is_terminated());
        assert!(!b.is_terminated());
    }
}
