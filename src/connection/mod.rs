pub mod config;
pub mod pool;

use crate::core::{KvError, Reply, Result};
use crate::storage::{Command, KeyValueStore, WatchGuard};
use std::sync::Arc;
use tracing::debug;

/// Backing-store connection handle
///
/// Executes commands against the store and carries the watch guards of an
/// optimistic transaction until `exec` or `unwatch`.
/// Similar to a Redis client connection.
pub struct Connection {
    /// Unique connection ID
    id: u64,
    /// Shared store instance
    store: Arc<dyn KeyValueStore>,
    /// Connection state
    state: ConnectionState,
    /// Keys watched since the last exec/unwatch
    watched: Vec<WatchGuard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Active,
    Closed,
}

impl Connection {
    /// Create a new connection (internal use)
    pub(crate) fn new(id: u64, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            id,
            store,
            state: ConnectionState::Active,
            watched: Vec::new(),
        }
    }

    /// Get connection ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Execute a single command immediately
    pub async fn execute(&self, command: Command) -> Result<Reply> {
        if self.state == ConnectionState::Closed {
            return Err(KvError::ConnectionClosed);
        }

        self.store.execute(command).await
    }

    /// Register `key` for optimistic-lock tracking
    ///
    /// The version observed now is compared at `exec`; re-watching a key
    /// keeps the first observation.
    pub async fn watch(&mut self, key: &str) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(KvError::ConnectionClosed);
        }

        if self.watched.iter().any(|guard| guard.key == key) {
            return Ok(());
        }

        let version = self.store.version(key).await?;
        self.watched.push(WatchGuard {
            key: key.to_string(),
            version,
        });
        Ok(())
    }

    /// Number of keys currently watched
    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// Drop all watch guards
    pub fn unwatch(&mut self) {
        self.watched.clear();
    }

    /// Atomically apply a batch guarded by the watched keys
    ///
    /// Guards are consumed whether or not the batch commits.
    pub async fn exec(&mut self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        if self.state == ConnectionState::Closed {
            return Err(KvError::ConnectionClosed);
        }

        let guards = std::mem::take(&mut self.watched);
        debug!(
            connection = self.id,
            commands = commands.len(),
            watched = guards.len(),
            "exec"
        );
        self.store.exec_atomic(&guards, commands).await
    }

    /// Check if connection is active
    pub fn is_active(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    /// Close the connection
    pub fn close(&mut self) {
        self.watched.clear();
        self.state = ConnectionState::Closed;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("watched", &self.watched)
            .finish()
    }
}
