//! Session manager error types.

use ledger_store::{AccountNumber, LedgerError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Session manager error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Every slot is occupied; the caller must retry later.
    #[error("no free session slot (capacity {max_sessions})")]
    CapacityExceeded { max_sessions: usize },

    /// The account asking for a session is not in the ledger.
    #[error("account {0} not found")]
    AccountNotFound(AccountNumber),

    /// The ledger could not be read during admission.
    #[error("ledger unavailable: {0}")]
    StoreUnavailable(#[source] LedgerError),

    /// EOF or I/O failure on a session channel.
    #[error("channel broken on slot {slot}: {reason}")]
    ChannelBroken { slot: usize, reason: String },

    /// The client process could not be started.
    #[error("failed to launch client: {0}")]
    Launch(#[source] std::io::Error),

    /// The client never opened its end of the outbound channel.
    #[error("client did not open {path} within {timeout:?}")]
    OpenTimeout { path: PathBuf, timeout: Duration },

    /// A channel filesystem object could not be created or opened.
    #[error("channel error at {path}: {source}")]
    Channel {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The manager no longer accepts connections.
    #[error("session manager is shutting down")]
    ShuttingDown,

    /// A blocking task panicked or was cancelled.
    #[error("internal task failed: {0}")]
    Task(String),
}

impl From<LedgerError> for SessionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(account) => Self::AccountNotFound(account),
            other => Self::StoreUnavailable(other),
        }
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
