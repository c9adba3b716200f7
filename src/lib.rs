// ============================================================================
// kvscheme Library
// ============================================================================

pub mod api;
pub mod connection;
pub mod core;
pub mod prelude;
pub mod schema;
pub mod storage;
pub mod transaction;
pub mod web;

// Re-export main types for convenience
pub use core::{KvError, Reply, Result};
pub use storage::{Command, KeyValueStore, MemoryStore};

// Re-export connection API
pub use connection::{
    Connection,
    config::{ConflictRetryPolicy, StoreConfig},
    pool::{ConnectionPool, PoolGuard, PoolStats},
};

pub use api::{ApiConfig, ApiError, ApiNode, Dispatcher, Request, Response};
pub use schema::{
    ContainerOps, Entity, Fragment, HashNode, KeyNode, Ops, OpsKind, RangeNode, Schema, SetNode,
};
pub use transaction::{AccessMode, Cx, Exec, Phase};

use std::sync::Arc;
use transaction::context::Backend;

// ============================================================================
// Client
// ============================================================================

/// Entry point holding the store, the connection pool and the shared
/// default connection
///
/// Every schema operation takes a `Cx`; `client.cx()` hands out the shared
/// one, isolated transactions are opened from it.
///
/// # Examples
///
/// ```
/// use kvscheme::{Client, Command};
///
/// # #[tokio::main]
/// # async fn main() -> kvscheme::Result<()> {
/// let client = Client::memory().await?;
/// let cx = client.cx();
///
/// cx.write(Command::Set { key: "greeting".into(), value: "hi".into() }).await?;
/// let reply = cx.read(Command::Get { key: "greeting".into() }).await?;
/// assert_eq!(reply.into_string().as_deref(), Some("hi"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    backend: Arc<Backend>,
}

impl Client {
    /// Connect to the process-wide store of `config.database`
    ///
    /// Clients naming the same database share one keyspace.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = MemoryStore::database(&config.database);
        Self::with_store(config, store).await
    }

    /// Client over a fresh private store
    pub async fn memory() -> Result<Self> {
        Self::with_store(StoreConfig::default(), Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(config: StoreConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let pool = ConnectionPool::new(config, store).await?;
        Ok(Self {
            backend: Arc::new(Backend::new(pool)),
        })
    }

    /// Handle for the shared default connection
    pub fn cx(&self) -> Cx {
        Cx::new(Arc::clone(&self.backend))
    }

    pub fn config(&self) -> &StoreConfig {
        self.backend.pool().config()
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        self.backend.pool().stats().await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("database", &self.config().database)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_memory() {
        let client = Client::memory().await.unwrap();
        let stats = client.stats().await;
        assert!(stats.total_connections > 0);
        assert!(!client.cx().is_isolated());
    }

    #[tokio::test]
    async fn test_databases_are_separate_keyspaces() {
        let name = |suffix: &str| format!("client-test-{}", suffix);
        let a = Client::connect(StoreConfig::new().database(&name("a")))
            .await
            .unwrap();
        let a_again = Client::connect(StoreConfig::new().database(&name("a")))
            .await
            .unwrap();
        let b = Client::connect(StoreConfig::new().database(&name("b")))
            .await
            .unwrap();

        a.cx()
            .write(Command::Set {
                key: "k".into(),
                value: "v".into(),
            })
            .await
            .unwrap();

        let get = Command::Get { key: "k".into() };
        assert_eq!(
            a_again.cx().read(get.clone()).await.unwrap(),
            Reply::Str("v".into())
        );
        assert_eq!(b.cx().read(get).await.unwrap(), Reply::Nil);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let err = Client::connect(StoreConfig::new().database(""))
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_clients_of_one_store_share_data() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let a = Client::with_store(StoreConfig::default(), Arc::clone(&store))
            .await
            .unwrap();
        let b = Client::with_store(StoreConfig::default(), store).await.unwrap();

        a.cx()
            .write(Command::Set {
                key: "k".into(),
                value: "v".into(),
            })
            .await
            .unwrap();
        let reply = b.cx().read(Command::Get { key: "k".into() }).await.unwrap();
        assert_eq!(reply, Reply::Str("v".into()));
    }
}
