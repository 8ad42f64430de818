//! The authoritative set of live connections

use super::connection::{ClientId, Connection};
use super::error::HubError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Live connections keyed by client id.
///
/// Every method takes the lock for the duration of a single call and never
/// across a send.
#[derive(Default)]
pub struct Registry {
    connections: RwLock<HashMap<ClientId, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection. Rejects an identifier that is already live.
    pub async fn add(&self, connection: Arc<Connection>) -> Result<(), HubError> {
        let mut connections = self.connections.write().await;
        let client_id = connection.client_id().clone();
        if connections.contains_key(&client_id) {
            return Err(HubError::DuplicateIdentifier(client_id));
        }
        connections.insert(client_id, connection);
        Ok(())
    }

    /// Remove a connection if it is the one registered under its id.
    ///
    /// Returns true only for the call that actually removed it, so a racing
    /// disconnect and explicit leave see exactly one removal. A newer
    /// connection that rejoined under the same id is left untouched.
    pub async fn remove(&self, connection: &Connection) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(connection.client_id()) {
            Some(live) if live.serial() == connection.serial() => {
                connections.remove(connection.client_id());
                true
            }
            _ => false,
        }
    }

    /// Point-in-time copy of the live set, safe to iterate while others
    /// join and leave
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().cloned().collect()
    }

    pub async fn get(&self, client_id: &ClientId) -> Option<Arc<Connection>> {
        self.connections.read().await.get(client_id).cloned()
    }

    pub async fn contains(&self, client_id: &ClientId) -> bool {
        self.connections.read().await.contains_key(client_id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Sorted ids of every live connection
    pub async fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.connections.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
