//! Connections keyed by account stream id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::config::ConnectionConfig;
use super::link::Connection;

/// Tracks one connection per stream id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection for `stream_id`, creating it if absent.
    ///
    /// An existing connection is returned as is, even if its configuration
    /// differs from `config`.
    pub async fn create(&self, stream_id: &str, config: ConnectionConfig) -> Arc<Connection> {
        let mut connections = self.connections.write().await;
        Arc::clone(connections.entry(stream_id.to_string()).or_insert_with(|| {
            debug!(stream_id, host = %config.host, "Registering connection");
            Arc::new(Connection::new(config))
        }))
    }

    /// Looks a connection up.
    pub async fn get(&self, stream_id: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(stream_id).cloned()
    }

    /// Removes a connection and tears its pipeline down.
    pub async fn remove(&self, stream_id: &str) -> Option<Arc<Connection>> {
        let removed = self.connections.write().await.remove(stream_id);
        if let Some(connection) = &removed {
            connection.hard_disconnect().await;
            debug!(stream_id, "Connection removed");
        }
        removed
    }

    /// Removes and tears down every connection, returning how many there were.
    pub async fn drain(&self) -> usize {
        let drained: Vec<_> = self.connections.write().await.drain().collect();
        for (stream_id, connection) in &drained {
            connection.hard_disconnect().await;
            debug!(stream_id = %stream_id, "Connection drained");
        }
        drained.len()
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns true if nothing is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::ConnectionStatus;
    use crate::types::Protocol;

    fn config(host: &str) -> ConnectionConfig {
        ConnectionConfig::new(host, Protocol::Imap)
    }

    #[tokio::test]
    async fn create_is_idempotent_per_stream() {
        let registry = ConnectionRegistry::new();
        let a = registry.create("acct-1", config("a.example.com")).await;
        let b = registry.create("acct-1", config("b.example.com")).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.config().host, "a.example.com");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn remove_and_drain() {
        let registry = ConnectionRegistry::new();
        registry.create("acct-1", config("a.example.com")).await;
        registry.create("acct-2", config("b.example.com")).await;

        let (client, _server) = tokio::io::duplex(64);
        let live = registry.get("acct-1").await.unwrap();
        live.attach(client).await.unwrap();

        let removed = registry.remove("acct-1").await.unwrap();
        assert_eq!(removed.status(), ConnectionStatus::Disconnected);
        assert!(registry.get("acct-1").await.is_none());
        assert!(registry.remove("acct-1").await.is_none());

        assert_eq!(registry.drain().await, 1);
        assert!(registry.is_empty().await);
    }
}
