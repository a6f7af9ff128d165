//! File system paths for the bank server.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Ledger filename under the data directory.
const LEDGER_FILE_NAME: &str = "cuentas.txt";
/// Transaction log filename under the data directory.
const TRANSACTION_LOG_NAME: &str = "transacciones.log";
/// Gate lock filename under the data directory.
const GATE_FILE_NAME: &str = "cuentas.lock";

/// Manages file system paths for the bank server.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.teller-bank)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.teller-bank`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir().ok_or(CoreError::NoHomeDir)?;

        Ok(Self {
            base_dir: home.join(".teller-bank"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.teller-bank).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.teller-bank/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the PID file path (~/.teller-bank/bank.pid).
    pub fn pid_file(&self) -> PathBuf {
        self.base_dir.join("bank.pid")
    }

    /// Get the data directory (~/.teller-bank/data).
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Get the default ledger path (~/.teller-bank/data/cuentas.txt).
    pub fn ledger_file(&self) -> PathBuf {
        self.data_dir().join(LEDGER_FILE_NAME)
    }

    /// Get the default transaction log path (~/.teller-bank/data/transacciones.log).
    pub fn transaction_log_file(&self) -> PathBuf {
        self.data_dir().join(TRANSACTION_LOG_NAME)
    }

    /// Get the default gate lock path (~/.teller-bank/data/cuentas.lock).
    pub fn gate_file(&self) -> PathBuf {
        self.data_dir().join(GATE_FILE_NAME)
    }

    /// Get the directory holding session FIFOs (~/.teller-bank/run).
    pub fn fifo_dir(&self) -> PathBuf {
        self.base_dir.join("run")
    }

    /// Get the logs directory (~/.teller-bank/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the structured log file path (~/.teller-bank/logs/bank.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("bank.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        for dir in [self.base_dir.clone(), self.data_dir(), self.fifo_dir(), self.logs_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|source| CoreError::CreateDir { path: dir.clone(), source })?;
        }
        Ok(())
    }
}
