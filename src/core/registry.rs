//! Connection registry
//! Maps connection identifiers to their outbound handles

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::connection::{Connection, OutboundSender};
use crate::error::{RelayError, Result};

/// Tracks every live connection by identifier.
///
/// Rooms only ever store identifiers; the write handle lives here so that
/// dropping a registry entry is enough to make a connection unreachable.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection. The existing entry wins on id collision.
    pub async fn register(&self, connection: Connection) -> Result<Arc<Connection>> {
        let mut connections = self.connections.write().await;
        if connections.contains_key(&connection.id) {
            return Err(RelayError::DuplicateConnection(connection.id));
        }
        let connection = Arc::new(connection);
        connections.insert(connection.id.clone(), connection.clone());
        Ok(connection)
    }

    /// Remove a connection, handing back the entry if it was present
    pub async fn unregister(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.write().await.remove(connection_id)
    }

    /// Resolve the outbound handle of a connection
    pub async fn lookup(&self, connection_id: &str) -> Result<OutboundSender> {
        self.connections
            .read()
            .await
            .get(connection_id)
            .map(|conn| conn.sender.clone())
            .ok_or_else(|| RelayError::NotFound(connection_id.to_string()))
    }

    pub async fn get(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(connection_id).cloned()
    }

    pub async fn contains(&self, connection_id: &str) -> bool {
        self.connections.read().await.contains_key(connection_id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
