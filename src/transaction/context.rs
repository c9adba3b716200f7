use super::isolated::{Isolated, Multi, NoSetup, no_setup};
use super::state::{Transaction, TransactionId};
use crate::connection::Connection;
use crate::connection::config::StoreConfig;
use crate::connection::pool::ConnectionPool;
use crate::core::{KvError, Reply, Result};
use crate::storage::Command;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// What a caller wants to do with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    /// Watch a key for an optimistic transaction
    Isolated,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::Isolated => "isolated",
        }
    }
}

/// Where an isolated `Cx` is inside its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Watches and gating reads; writes are rejected
    Setup,
    /// Writes are queued into the batch
    Body,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Body => "multi",
        }
    }
}

/// Store access shared by every `Cx` of one client.
pub(crate) struct Backend {
    pool: ConnectionPool,
    /// Default connection for calls outside any transaction
    shared: Connection,
}

impl Backend {
    pub(crate) fn new(pool: ConnectionPool) -> Self {
        let shared = pool.open_unpooled();
        Self { pool, shared }
    }

    pub(crate) fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

#[derive(Clone)]
enum Scope {
    Shared,
    Isolated {
        tx: Arc<Transaction>,
        phase: Phase,
    },
}

/// Transaction context handle
///
/// Every Ops call takes a `Cx`. A shared `Cx` runs commands on the client's
/// default connection. Inside `isolated(..).multi(..).exec()` the closures
/// receive an isolated `Cx` bound to the transaction's dedicated
/// connection, and anything they call with it (including nested
/// transactions) lands in the same batch.
#[derive(Clone)]
pub struct Cx {
    backend: Arc<Backend>,
    scope: Scope,
}

impl Cx {
    pub(crate) fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            scope: Scope::Shared,
        }
    }

    pub(crate) fn scoped(&self, tx: Arc<Transaction>, phase: Phase) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            scope: Scope::Isolated { tx, phase },
        }
    }

    pub(crate) fn backend(&self) -> &Backend {
        &self.backend
    }

    pub(crate) fn transaction(&self) -> Option<&Arc<Transaction>> {
        match &self.scope {
            Scope::Shared => None,
            Scope::Isolated { tx, .. } => Some(tx),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        self.backend.pool.config()
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self.scope, Scope::Isolated { .. })
    }

    pub fn phase(&self) -> Option<Phase> {
        match &self.scope {
            Scope::Shared => None,
            Scope::Isolated { phase, .. } => Some(*phase),
        }
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction().map(|tx| tx.id())
    }

    /// Check that `mode` is available in the current scope
    pub fn check(&self, mode: AccessMode) -> Result<()> {
        let phase = match (&self.scope, mode) {
            (_, AccessMode::Read) => return Ok(()),
            (Scope::Shared, AccessMode::Write) => return Ok(()),
            (Scope::Shared, AccessMode::Isolated) => "shared",
            (Scope::Isolated { phase, .. }, AccessMode::Write) if *phase == Phase::Body => {
                return Ok(());
            }
            (Scope::Isolated { phase, .. }, AccessMode::Isolated) if *phase == Phase::Setup => {
                return Ok(());
            }
            (Scope::Isolated { phase, .. }, _) => phase.as_str(),
        };

        Err(KvError::AccessMode {
            mode: mode.as_str(),
            phase,
        })
    }

    /// Run a read immediately
    ///
    /// Inside a transaction the read goes through the dedicated connection
    /// and sees committed state, not the queued batch.
    pub async fn read(&self, command: Command) -> Result<Reply> {
        match &self.scope {
            Scope::Shared => self.backend.shared.execute(command).await,
            Scope::Isolated { tx, .. } => {
                let connection = tx.connection().lock().await;
                let connection = connection.as_ref().ok_or(KvError::ConnectionClosed)?;
                connection.execute(command).await
            }
        }
    }

    /// Run a write
    ///
    /// Shared: executes immediately. Multi body: queued, returns
    /// `Reply::Queued`. Setup: rejected.
    pub async fn write(&self, command: Command) -> Result<Reply> {
        self.check(AccessMode::Write)?;

        match &self.scope {
            Scope::Shared => self.backend.shared.execute(command).await,
            Scope::Isolated { tx, .. } => {
                tx.record_command(command)?;
                Ok(Reply::Queued)
            }
        }
    }

    /// Whether `command` is already waiting in the active batch
    ///
    /// Lets conditional writes (append-if-absent) stay idempotent when the
    /// same transaction issues them twice.
    pub fn is_queued(&self, command: &Command) -> bool {
        self.transaction().is_some_and(|tx| tx.has_queued(command))
    }

    /// Register `key` for optimistic-lock tracking (setup phase only)
    pub async fn watch(&self, key: &str) -> Result<()> {
        self.check(AccessMode::Isolated)?;

        let Some(tx) = self.transaction() else {
            return Err(KvError::NoTransaction("watch"));
        };
        let mut connection = tx.connection().lock().await;
        let connection = connection.as_mut().ok_or(KvError::ConnectionClosed)?;
        connection.watch(key).await
    }

    /// Register work that must finish before the batch is submitted
    pub fn defer<F>(&self, work: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let Some(tx) = self.transaction() else {
            return Err(KvError::NoTransaction("defer"));
        };
        tx.push_pending(Box::pin(work))
    }

    /// Start an optimistic transaction
    ///
    /// `setup` runs on a dedicated connection (watches, gating reads) and
    /// its result is handed to the `multi` body.
    pub fn isolated<S, SFut, T>(&self, setup: S) -> Isolated<S>
    where
        S: FnOnce(Cx) -> SFut,
        SFut: Future<Output = Result<T>>,
    {
        Isolated::new(self.clone(), setup)
    }

    /// Transaction without watches
    pub fn multi<B, BFut, R>(&self, body: B) -> Multi<NoSetup, B>
    where
        B: FnOnce(Cx, ()) -> BFut,
        BFut: Future<Output = Result<R>>,
    {
        Isolated::new(self.clone(), no_setup as NoSetup).multi(body)
    }

    /// Re-run `operation` while it fails with a conflict
    ///
    /// Backs off per the client's `ConflictRetryPolicy`. On an isolated
    /// `Cx` the operation runs once: conflicts only surface at the
    /// outermost exec, which owns the retry.
    pub async fn retry_on_conflict<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(Cx) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.is_isolated() {
            return operation(self.clone()).await;
        }

        let policy = self.config().conflict_retry.clone();
        let mut attempt = 1usize;
        loop {
            match operation(self.clone()).await {
                Err(err) if err.is_conflict() && attempt < policy.max_attempts => {
                    let backoff_ms = policy.backoff_ms(attempt);
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        backoff_ms,
                        error = %err,
                        "transaction conflict, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl std::fmt::Debug for Cx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cx")
            .field("transaction", &self.transaction_id())
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn cx() -> Cx {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let pool = ConnectionPool::new(StoreConfig::default(), store)
            .await
            .unwrap();
        Cx::new(Arc::new(Backend::new(pool)))
    }

    fn set(key: &str, value: &str) -> Command {
        Command::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    fn get(key: &str) -> Command {
        Command::Get { key: key.into() }
    }

    #[tokio::test]
    async fn test_shared_writes_are_immediate() {
        let cx = cx().await;
        cx.write(set("k", "v")).await.unwrap();

        let value = cx.read(get("k")).await.unwrap();
        assert_eq!(value, Reply::Str("v".into()));
    }

    #[tokio::test]
    async fn test_watch_and_defer_need_a_transaction() {
        let cx = cx().await;

        assert!(matches!(
            cx.watch("k").await,
            Err(KvError::AccessMode { phase: "shared", .. })
        ));
        assert!(matches!(
            cx.defer(async { Ok(()) }),
            Err(KvError::NoTransaction("defer"))
        ));
    }

    #[tokio::test]
    async fn test_body_writes_are_queued_until_exec() {
        let cx = cx().await;
        let outside = cx.clone();

        let exec = cx
            .multi(|cx, ()| async move {
                let reply = cx.write(set("k", "v")).await?;
                assert_eq!(reply, Reply::Queued);
                // Not applied yet
                assert!(outside.read(get("k")).await?.is_nil());
                assert!(cx.read(get("k")).await?.is_nil());
                Ok(7)
            })
            .exec()
            .await
            .unwrap();

        assert_eq!(exec.value, 7);
        assert_eq!(exec.replies, Some(vec![Reply::Ok]));
        assert_eq!(cx.read(get("k")).await.unwrap(), Reply::Str("v".into()));
    }

    #[tokio::test]
    async fn test_setup_rejects_writes() {
        let cx = cx().await;

        let result = cx
            .isolated(|cx| async move {
                cx.write(set("k", "v")).await?;
                Ok(())
            })
            .multi(|_cx, ()| async move { Ok(()) })
            .exec()
            .await;

        assert!(matches!(
            result,
            Err(KvError::AccessMode {
                mode: "write",
                phase: "setup"
            })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writer_causes_conflict() {
        let cx = cx().await;
        let outside = cx.clone();
        cx.write(set("gate", "0")).await.unwrap();

        let result = cx
            .isolated(|cx| async move {
                cx.watch("gate").await?;
                outside.write(set("gate", "1")).await?;
                Ok(())
            })
            .multi(|cx, ()| async move {
                cx.write(set("guarded", "x")).await?;
                Ok(())
            })
            .exec()
            .await;

        assert!(matches!(result, Err(KvError::Conflict { ref key }) if key == "gate"));
        assert!(cx.read(get("guarded")).await.unwrap().is_nil());
    }

    #[tokio::test]
    async fn test_nested_transactions_share_one_batch() {
        let cx = cx().await;

        let outer = cx
            .multi(|cx, ()| async move {
                cx.write(set("a", "1")).await?;
                let inner = cx
                    .isolated(|cx| async move { cx.watch("b").await })
                    .multi(|cx, ()| async move {
                        cx.write(set("b", "2")).await?;
                        Ok(cx.transaction_id())
                    })
                    .exec()
                    .await?;
                assert!(inner.replies.is_none());
                assert_eq!(inner.value, cx.transaction_id());
                Ok(())
            })
            .exec()
            .await
            .unwrap();

        assert_eq!(outer.replies, Some(vec![Reply::Ok, Reply::Ok]));
        assert_eq!(cx.read(get("b")).await.unwrap(), Reply::Str("2".into()));
    }

    #[tokio::test]
    async fn test_deferred_work_joins_the_batch() {
        let cx = cx().await;

        cx.multi(|cx, ()| async move {
            let deferred = cx.clone();
            cx.defer(async move {
                deferred.write(set("late", "yes")).await?;
                Ok(())
            })?;
            Ok(())
        })
        .exec()
        .await
        .unwrap();

        assert_eq!(cx.read(get("late")).await.unwrap(), Reply::Str("yes".into()));
    }

    #[tokio::test]
    async fn test_retry_on_conflict_reruns_the_transaction() {
        let cx = cx().await;
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&attempts);
        let outside = cx.clone();
        cx.retry_on_conflict(move |cx| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            let outside = outside.clone();
            async move {
                cx.isolated(|cx| async move {
                    cx.watch("k").await?;
                    if attempt == 0 {
                        outside.write(set("k", "interference")).await?;
                    }
                    Ok(())
                })
                .multi(|cx, ()| async move { cx.write(set("k", "final")).await })
                .exec()
                .await
            }
        })
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(cx.read(get("k")).await.unwrap(), Reply::Str("final".into()));
    }
}
