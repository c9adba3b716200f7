use super::{Connection, config::StoreConfig};
use crate::core::{KvError, Result};
use crate::storage::KeyValueStore;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Connection pool
///
/// Hands out dedicated connections for isolated transactions so that watch
/// guards of one transaction never mix with another caller's commands.
pub struct ConnectionPool {
    /// Pool configuration
    config: StoreConfig,
    /// Available connections
    available: Arc<Mutex<VecDeque<PooledConnection>>>,
    /// Total number of connections created
    total_connections: Arc<AtomicUsize>,
    /// Shared store instance
    store: Arc<dyn KeyValueStore>,
    /// Next connection ID
    next_id: AtomicU64,
}

/// A connection from the pool
struct PooledConnection {
    connection: Connection,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(connection: Connection) -> Self {
        let now = Instant::now();
        Self {
            connection,
            created_at: now,
            last_used: now,
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        if let Some(lifetime) = max_lifetime {
            self.created_at.elapsed() > lifetime
        } else {
            false
        }
    }

    fn is_idle_too_long(&self, idle_timeout: Option<Duration>) -> bool {
        if let Some(timeout) = idle_timeout {
            self.last_used.elapsed() > timeout
        } else {
            false
        }
    }

    fn refresh_last_used(&mut self) {
        self.last_used = Instant::now();
    }
}

impl ConnectionPool {
    /// Create a new connection pool over `store`
    pub async fn new(config: StoreConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        config.validate().map_err(KvError::InvalidConfig)?;

        let pool = Self {
            config,
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
            store,
            next_id: AtomicU64::new(1),
        };

        // Pre-create minimum connections
        pool.ensure_min_connections().await;

        Ok(pool)
    }

    /// Pool configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Open a connection outside the pool's accounting
    ///
    /// Used for the client's shared default connection.
    pub(crate) fn open_unpooled(&self) -> Connection {
        Connection::new(self.allocate_id(), Arc::clone(&self.store))
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<PoolGuard> {
        let start = Instant::now();

        loop {
            // Try to get an available connection
            if let Some(mut pooled) = self.try_get_available().await {
                pooled.refresh_last_used();
                return Ok(self.guard(pooled.connection));
            }

            // Try to create a new connection if under limit
            if let Some(conn) = self.try_create_connection() {
                return Ok(self.guard(conn));
            }

            // Check timeout
            if start.elapsed() > self.config.connect_timeout {
                warn!(
                    max_connections = self.config.max_connections,
                    "connection pool exhausted"
                );
                return Err(KvError::PoolTimeout);
            }

            // Wait a bit before retrying
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn guard(&self, connection: Connection) -> PoolGuard {
        PoolGuard {
            connection: Some(connection),
            pool: self.available.clone(),
            total_connections: self.total_connections.clone(),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Try to get an available connection from the pool
    async fn try_get_available(&self) -> Option<PooledConnection> {
        let mut available = self.available.lock().await;

        let mut kept = VecDeque::with_capacity(available.len());
        let mut removed = 0usize;
        while let Some(pooled) = available.pop_front() {
            if pooled.is_expired(self.config.max_lifetime)
                || pooled.is_idle_too_long(self.config.idle_timeout)
            {
                removed += 1;
            } else {
                kept.push_back(pooled);
            }
        }
        *available = kept;

        if removed > 0 {
            self.total_connections.fetch_sub(removed, Ordering::SeqCst);
        }

        available.pop_front()
    }

    /// Try to create a new connection if under limit
    fn try_create_connection(&self) -> Option<Connection> {
        let reserved = self
            .total_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                (total < self.config.max_connections).then_some(total + 1)
            });

        reserved.ok().map(|_| self.open_unpooled())
    }

    /// Ensure minimum number of connections
    async fn ensure_min_connections(&self) {
        let mut available = self.available.lock().await;

        while self.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            available.push_back(PooledConnection::new(self.open_unpooled()));
            self.total_connections.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let available = self.available.lock().await;
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available.len(),
            active_connections: total.saturating_sub(available.len()),
            max_connections: self.config.max_connections,
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool (with its watch guards dropped) when
/// dropped.
pub struct PoolGuard {
    connection: Option<Connection>,
    pool: Arc<Mutex<VecDeque<PooledConnection>>>,
    total_connections: Arc<AtomicUsize>,
}

impl Deref for PoolGuard {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection
            .as_ref()
            .expect("PoolGuard holds its connection until dropped")
    }
}

impl DerefMut for PoolGuard {
    fn deref_mut(&mut self) -> &mut Connection {
        self.connection
            .as_mut()
            .expect("PoolGuard holds its connection until dropped")
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.unwatch();

            // Try to return to pool if we can acquire the lock immediately
            if let Ok(mut pool) = self.pool.try_lock() {
                pool.push_back(PooledConnection::new(connection));
            } else {
                warn!(
                    connection = connection.id(),
                    "pool lock busy on release, dropping connection"
                );
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}
