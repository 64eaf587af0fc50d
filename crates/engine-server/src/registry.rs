//! Registry of connected clients.
//!
//! Client tasks add and remove themselves while the broadcast loop
//! iterates. The broadcaster never iterates the live map: it takes a
//! `snapshot()` (a cloned `Vec`) and releases the lock before sending,
//! so mutations never race with iteration.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::types::{Connection, ConnectionId};

#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<ConnectionId, Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    pub async fn add(&self, conn: Connection) {
        let mut guard = self.inner.write().await;
        guard.insert(conn.id(), conn);
    }

    /// Register a connection unless `max` connections are already present.
    ///
    /// The check and the insert happen under one write lock.
    pub async fn try_add(&self, conn: Connection, max: usize) -> bool {
        let mut guard = self.inner.write().await;
        if guard.len() >= max {
            return false;
        }
        guard.insert(conn.id(), conn);
        true
    }

    /// Remove a connection and mark it closed. Idempotent.
    ///
    /// Returns whether the connection was still registered.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut guard = self.inner.write().await;
            guard.remove(&id)
        };
        match removed {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        }
    }

    /// Copy of the current membership, safe to iterate while others mutate.
    pub async fn snapshot(&self) -> Vec<Connection> {
        let guard = self.inner.read().await;
        guard.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Close and forget every connection.
    pub async fn clear(&self) {
        let drained: Vec<Connection> = {
            let mut guard = self.inner.write().await;
            guard.drain().map(|(_, conn)| conn).collect()
        };
        for conn in drained {
            conn.close();
        }
    }
}
