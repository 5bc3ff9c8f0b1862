//! Set of live connections.
//!
//! [`ConnectionRegistry`] maps every open connection to its
//! [`ConnectionHandle`]. A connection is registered right before its read
//! loop starts and removed when the loop exits, so the registry always
//! reflects the sockets the server still owns.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::ConnectionId;

/// Handle to a live connection.
///
/// Cancelling the handle ends the connection's read loop: it sends a close
/// frame and releases the socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Connection identifier.
    pub id: ConnectionId,
    /// When the upgrade completed.
    pub connected_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Creates a handle around the connection's cancellation token.
    #[must_use]
    pub fn new(id: ConnectionId, cancel: CancellationToken) -> Self {
        Self {
            id,
            connected_at: Utc::now(),
            cancel,
        }
    }

    /// Asks the read loop to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observed by the read loop.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Registry of open connections keyed by [`ConnectionId`].
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. A handle with the same id is replaced.
    pub async fn register(&self, handle: ConnectionHandle) {
        self.connections.write().await.insert(handle.id, handle);
    }

    /// Removes a connection, returning its handle if it was registered.
    pub async fn remove(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.write().await.remove(&id)
    }

    /// Returns the handle of a live connection.
    pub async fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.read().await.get(&id).cloned()
    }

    /// Ids of all live connections, in no particular order.
    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().await.keys().copied().collect()
    }

    /// Cancels every live connection. Returns how many were signalled.
    ///
    /// Handles stay registered until their read loops exit.
    pub async fn cancel_all(&self) -> usize {
        let map = self.connections.read().await;
        for handle in map.values() {
            handle.cancel();
        }
        map.len()
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no connection is open.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_handle() -> ConnectionHandle {
        ConnectionHandle::new(ConnectionId::new(), CancellationToken::new())
    }

    #[tokio::test]
    async fn register_and_get() {
        let registry = ConnectionRegistry::new();
        let handle = make_handle();
        let id = handle.id;

        registry.register(handle).await;
        assert!(registry.get(id).await.is_some());
        assert_eq!(registry.ids().await, vec![id]);
    }

    #[tokio::test]
    async fn remove_returns_handle_once() {
        let registry = ConnectionRegistry::new();
        let handle = make_handle();
        let id = handle.id;
        registry.register(handle).await;

        assert!(registry.remove(id).await.is_some());
        assert!(registry.remove(id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn cancel_all_signals_every_handle() {
        let registry = ConnectionRegistry::new();
        let a = make_handle();
        let b = make_handle();
        registry.register(a.clone()).await;
        registry.register(b.clone()).await;

        assert_eq!(registry.cancel_all().await, 2);
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn cancelling_clone_cancels_token() {
        let handle = make_handle();
        let token = handle.token().clone();
        handle.clone().cancel();
        assert!(token.is_cancelled());
    }
}
