//! Error types for bank operations.

use thiserror::Error;

/// Bank operations error type.
#[derive(Debug, Error)]
pub enum OperationsError {
    /// Transaction log could not be written.
    #[error("transaction log write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Transaction log entry could not be serialized.
    #[error("transaction log serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Ledger access failed outside request processing.
    #[error(transparent)]
    Ledger(#[from] ledger_store::LedgerError),
}

/// Result type for bank operations.
pub type OperationsResult<T> = Result<T, OperationsError>;
