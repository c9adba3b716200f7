use std::time::Duration;

/// Store configuration
///
/// Which keyspace to open plus how the pool of dedicated (isolated)
/// connections behaves.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Logical database name; each name is a separate keyspace
    pub database: String,

    /// How long to wait for a free dedicated connection
    pub connect_timeout: Duration,

    /// Maximum number of dedicated connections in pool
    pub max_connections: usize,

    /// Minimum number of dedicated connections in pool
    pub min_connections: usize,

    /// Connection idle timeout
    pub idle_timeout: Option<Duration>,

    /// Maximum connection lifetime
    pub max_lifetime: Option<Duration>,

    /// Retry behaviour for `Cx::retry_on_conflict`
    pub conflict_retry: ConflictRetryPolicy,
}

/// Bounded exponential backoff for transactions that hit a watch conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 2,
            max_backoff_ms: 50,
        }
    }
}

impl ConflictRetryPolicy {
    /// Computes exponential retry backoff in milliseconds.
    pub fn backoff_ms(&self, attempt: usize) -> u64 {
        let base = self.base_backoff_ms.max(1);
        let cap = self.max_backoff_ms.max(base);

        let mut backoff = base;
        for _ in 1..attempt {
            backoff = backoff.saturating_mul(2).min(cap);
        }
        backoff
    }
}

impl StoreConfig {
    /// Default pool settings over database `"0"`
    pub fn new() -> Self {
        Self {
            database: "0".to_string(),
            connect_timeout: Duration::from_secs(30),
            max_connections: 10,
            min_connections: 1,
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
            conflict_retry: ConflictRetryPolicy::default(),
        }
    }

    /// Set the database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set minimum connections
    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set maximum lifetime
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Set the conflict retry policy
    pub fn conflict_retry(mut self, policy: ConflictRetryPolicy) -> Self {
        self.conflict_retry = policy;
        self
    }

    /// Build from the environment
    ///
    /// `KVSCHEME_DATABASE` selects the database; everything else uses
    /// defaults.
    pub fn from_env() -> Self {
        match std::env::var("KVSCHEME_DATABASE") {
            Ok(database) if !database.is_empty() => Self::new().database(&database),
            _ => Self::new(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.database.is_empty() {
            return Err("database cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }

        if self.min_connections > self.max_connections {
            return Err("min_connections cannot exceed max_connections".to_string());
        }

        if self.conflict_retry.max_attempts == 0 {
            return Err("conflict_retry.max_attempts must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
