use super::command::Command;
use crate::core::{Reply, Result};
use async_trait::async_trait;

/// Version observed for a key when it was watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchGuard {
    pub key: String,
    pub version: u64,
}

/// Storage engine trait - allows pluggable key-value backends
///
/// The in-process `MemoryStore` is the shipped implementation; a network
/// client for a remote store implements the same surface.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Execute one command immediately.
    async fn execute(&self, command: Command) -> Result<Reply>;

    /// Current modification version of `key` (0 if it was never written).
    async fn version(&self, key: &str) -> Result<u64>;

    /// Apply `commands` atomically, provided every guard still matches.
    ///
    /// Fails with `KvError::Conflict` without applying anything when a
    /// guarded key changed since it was watched.
    async fn exec_atomic(&self, guards: &[WatchGuard], commands: Vec<Command>)
    -> Result<Vec<Reply>>;
}
