// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Optimistic transactions over the key-value store (watch / multi / exec).
//
// - `Cx`: explicit transaction context handle threaded through every Ops call
// - `isolated(setup).multi(body).exec()`: dedicated connection, watched keys,
//   queued batch, atomic commit; nested transactions join the enclosing batch
// - State Pattern: Transaction state management (Active, Committed, Aborted)
//
// ============================================================================

pub mod context;
pub mod isolated;
pub mod state;

pub use context::{AccessMode, Cx, Phase};
pub use isolated::{Exec, Isolated, Multi};
pub use state::{Transaction, TransactionId, TransactionState};
