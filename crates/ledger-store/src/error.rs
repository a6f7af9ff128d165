//! Ledger error types.

use crate::AccountNumber;
use std::path::PathBuf;
use thiserror::Error;

/// Ledger Store and Gate errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The backing file could not be opened, read, or committed.
    #[error("ledger unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The referenced account is not in the table.
    #[error("account {0} not found")]
    NotFound(AccountNumber),

    /// A ledger line does not follow the record format.
    #[error("ledger line {line} is corrupt: {reason}")]
    Corrupt { line: usize, reason: String },

    /// Two records share an account number.
    #[error("duplicate account number {0}")]
    DuplicateAccount(AccountNumber),

    /// Holder names may not contain the field delimiter or line breaks.
    #[error("invalid holder name: {0:?}")]
    InvalidHolderName(String),

    /// Seeding refused to replace an existing ledger.
    #[error("ledger already exists at {0}")]
    AlreadyExists(PathBuf),

    /// The gate lock file could not be created or locked.
    #[error("gate error at {path}: {source}")]
    Gate {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl LedgerError {
    /// Whether the error means the ledger could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Gate { .. })
    }
}

/// Result type alias using LedgerError.
pub type LedgerResult<T> = Result<T, LedgerError>;
