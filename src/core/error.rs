use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("Transaction conflict: watched key '{key}' changed before exec")]
    Conflict { key: String },

    #[error("Wrong type for key '{key}': expected {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("'{0}' requires an active isolated transaction")]
    NoTransaction(&'static str),

    #[error("{mode} access is not available during the {phase} phase")]
    AccessMode {
        mode: &'static str,
        phase: &'static str,
    },

    #[error("Schema conflict at '{path}': {reason}")]
    SchemaConflict { path: String, reason: String },

    #[error("Field '{field}' is not declared under '{path}'")]
    UnknownField { path: String, field: String },

    #[error("Entity '{path}' is a {actual} node, expected {expected}")]
    KindMismatch {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Connection pool timeout: no connections available")]
    PoolTimeout,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl KvError {
    /// True for optimistic-lock violations raised by `exec`.
    ///
    /// Callers that know a retry strategy (pick a fresh identifier, re-read
    /// and re-apply) match on this; everything else is a hard failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, KvError::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, KvError>;

impl<T> From<std::sync::PoisonError<T>> for KvError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
