// ============================================================================
// Transaction State Management
// ============================================================================
//
// One optimistic transaction: a dedicated connection carrying the watch
// guards, the queued write batch, and pending work that must finish before
// the batch is submitted.
//
// State transitions:
//   Active ──exec ok──> Committed
//     │
//     └──conflict / error──> Aborted
//
// ============================================================================

use crate::connection::pool::PoolGuard;
use crate::core::{KvError, Result};
use crate::storage::Command;
use futures::future::BoxFuture;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting watches and queued writes
    Active,

    /// Batch applied atomically
    Committed,

    /// Conflict or failure; nothing applied
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Work registered with `Cx::defer`, awaited before the batch is submitted.
pub type PendingWork = BoxFuture<'static, Result<()>>;

/// An optimistic transaction bound to one dedicated connection
pub struct Transaction {
    id: TransactionId,
    state: Mutex<TransactionState>,
    /// Dedicated connection; holds the watch guards
    connection: tokio::sync::Mutex<Option<PoolGuard>>,
    /// Writes queued by every (possibly nested) multi body, in issue order
    batch: Mutex<Vec<Command>>,
    pending: Mutex<Vec<PendingWork>>,
    started: std::time::Instant,
}

impl Transaction {
    pub(crate) fn new(connection: Option<PoolGuard>) -> Self {
        Self {
            id: TransactionId::new(),
            state: Mutex::new(TransactionState::Active),
            connection: tokio::sync::Mutex::new(connection),
            batch: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            started: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(TransactionState::Aborted)
    }

    pub fn duration(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    pub(crate) fn connection(&self) -> &tokio::sync::Mutex<Option<PoolGuard>> {
        &self.connection
    }

    /// Queue a write into the batch
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub(crate) fn record_command(&self, command: Command) -> Result<()> {
        let state = self.state();
        if !state.is_active() {
            return Err(KvError::Execution(format!(
                "Cannot queue {}: transaction {} is {}",
                command, self.id, state
            )));
        }

        self.batch.lock()?.push(command);
        Ok(())
    }

    pub fn queued_count(&self) -> usize {
        self.batch.lock().map(|batch| batch.len()).unwrap_or(0)
    }

    /// Whether an identical command is already queued
    pub fn has_queued(&self, command: &Command) -> bool {
        self.batch
            .lock()
            .map(|batch| batch.contains(command))
            .unwrap_or(false)
    }

    pub(crate) fn take_batch(&self) -> Result<Vec<Command>> {
        Ok(std::mem::take(&mut *self.batch.lock()?))
    }

    pub(crate) fn push_pending(&self, work: PendingWork) -> Result<()> {
        let state = self.state();
        if !state.is_active() {
            return Err(KvError::Execution(format!(
                "Cannot defer work: transaction {} is {}",
                self.id, state
            )));
        }

        self.pending.lock()?.push(work);
        Ok(())
    }

    pub(crate) fn take_pending(&self) -> Result<Vec<PendingWork>> {
        Ok(std::mem::take(&mut *self.pending.lock()?))
    }

    pub(crate) fn finish(&self, outcome: TransactionState) -> Result<()> {
        let mut state = self.state.lock()?;
        if !state.is_active() {
            return Err(KvError::Execution(format!(
                "Cannot finish: transaction {} is already {}",
                self.id, *state
            )));
        }

        if outcome == TransactionState::Aborted {
            self.batch.lock()?.clear();
            self.pending.lock()?.clear();
        }
        *state = outcome;
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("queued", &self.queued_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &str) -> Command {
        Command::Set {
            key: key.into(),
            value: "v".into(),
        }
    }

    #[test]
    fn test_transaction_id_generation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_transaction_lifecycle() {
        let txn = Transaction::new(None);

        assert_eq!(txn.state(), TransactionState::Active);
        txn.record_command(set("a")).unwrap();
        txn.record_command(set("b")).unwrap();
        assert_eq!(txn.queued_count(), 2);
        assert!(txn.has_queued(&set("b")));

        let batch = txn.take_batch().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].key(), "a");

        txn.finish(TransactionState::Committed).unwrap();
        assert!(txn.state().is_terminal());
    }

    #[test]
    fn test_cannot_finish_twice() {
        let txn = Transaction::new(None);

        txn.finish(TransactionState::Committed).unwrap();
        assert!(txn.finish(TransactionState::Aborted).is_err());
    }

    #[test]
    fn test_abort_clears_batch() {
        let txn = Transaction::new(None);
        txn.record_command(set("a")).unwrap();

        txn.finish(TransactionState::Aborted).unwrap();
        assert_eq!(txn.queued_count(), 0);
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_cannot_record_after_commit() {
        let txn = Transaction::new(None);
        txn.finish(TransactionState::Committed).unwrap();

        assert!(txn.record_command(set("a")).is_err());
    }
}
