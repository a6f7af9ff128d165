//! Configuration management for the bank server.

use crate::{CoreError, CoreResult, Paths};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default FIFO name prefix; paths become `<prefix>_<slot>_to_client`.
const DEFAULT_FIFO_BASE_NAME: &str = "banco_fifo";

/// Default number of concurrent teller sessions.
const DEFAULT_MAX_SESSIONS: usize = 5;

/// Default client launch template. Placeholders are substituted per session.
pub const DEFAULT_CLIENT_COMMAND: &[&str] = &[
    "x-terminal-emulator",
    "-e",
    "teller-bank",
    "teller",
    "--to-client",
    "{to_client}",
    "--from-client",
    "{from_client}",
    "--account",
    "{account}",
];

/// Optional per-operation maximums. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub withdraw_limit: Option<Decimal>,
    pub transfer_limit: Option<Decimal>,
}

/// Thresholds for the suspicious-activity monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Withdrawals or transfers above this amount raise an alert.
    pub large_amount: Decimal,
    /// More than this many withdrawals in a row on one account raise an alert.
    pub consecutive_withdrawals: u32,
    /// More than this many transfers in a row on one account raise an alert.
    pub consecutive_transfers: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            large_amount: Decimal::new(1_000_000, 2),
            consecutive_withdrawals: 3,
            consecutive_transfers: 3,
        }
    }
}

/// Main server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Ledger table path. Defaults to `<base>/data/cuentas.txt`.
    pub ledger_file: Option<PathBuf>,
    /// Transaction log path. Defaults to `<base>/data/transacciones.log`.
    pub transaction_log_file: Option<PathBuf>,
    /// Gate lock file path. Defaults to `<base>/data/cuentas.lock`.
    pub gate_file: Option<PathBuf>,
    /// Directory where session FIFOs are created. Defaults to `<base>/run`.
    pub fifo_dir: Option<PathBuf>,
    /// FIFO name prefix.
    pub fifo_base_name: String,
    /// Number of session slots.
    pub max_sessions: usize,
    /// Upper bound on one polling wait.
    pub poll_interval_ms: u64,
    /// How long a launched client has to open its channels.
    pub open_timeout_ms: u64,
    /// How long one response write may block.
    pub write_timeout_ms: u64,
    /// How long a client gets to exit after SIGTERM at shutdown.
    pub shutdown_timeout_ms: u64,
    /// Client launch argv template.
    pub client_command: Vec<String>,
    pub limits: LimitsConfig,
    pub alerts: AlertConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            ledger_file: None,
            transaction_log_file: None,
            gate_file: None,
            fifo_dir: None,
            fifo_base_name: DEFAULT_FIFO_BASE_NAME.to_string(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            poll_interval_ms: 50,
            open_timeout_ms: 10_000,
            write_timeout_ms: 2_000,
            shutdown_timeout_ms: 3_000,
            client_command: DEFAULT_CLIENT_COMMAND
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
            limits: LimitsConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `<base>/config.json`, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            debug!(path = %config_path.display(), "loading config");
            Self::load_from_file(&config_path)?
        } else {
            debug!(path = %config_path.display(), "no config file, using defaults");
            Self::default()
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CoreError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to `<base>/config.json`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        let path = paths.config_file();
        std::fs::write(&path, content).map_err(|source| CoreError::Write { path, source })
    }

    /// Override fields from `TELLER_BANK_*` variables resolved through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("TELLER_BANK_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(ledger) = lookup("TELLER_BANK_LEDGER") {
            self.ledger_file = Some(PathBuf::from(ledger));
        }
        if let Some(raw) = lookup("TELLER_BANK_MAX_SESSIONS") {
            self.max_sessions = raw.trim().parse().map_err(|_| {
                CoreError::InvalidConfig(format!("TELLER_BANK_MAX_SESSIONS is not a number: {raw}"))
            })?;
        }
        Ok(())
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_sessions == 0 {
            return Err(CoreError::InvalidConfig("max_sessions must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(CoreError::InvalidConfig("poll_interval_ms must be positive".into()));
        }
        if self.client_command.is_empty() {
            return Err(CoreError::InvalidConfig("client_command must not be empty".into()));
        }
        if self.fifo_base_name.is_empty() || self.fifo_base_name.contains('/') {
            return Err(CoreError::InvalidConfig(format!(
                "fifo_base_name is not a plain file name: {:?}",
                self.fifo_base_name
            )));
        }
        Ok(())
    }

    pub fn ledger_file(&self, paths: &Paths) -> PathBuf {
        self.ledger_file
            .clone()
            .unwrap_or_else(|| paths.ledger_file())
    }

    pub fn transaction_log_file(&self, paths: &Paths) -> PathBuf {
        self.transaction_log_file
            .clone()
            .unwrap_or_else(|| paths.transaction_log_file())
    }

    /// Gate lock path. Follows a custom ledger path when none is configured.
    pub fn gate_file(&self, paths: &Paths) -> PathBuf {
        match (&self.gate_file, &self.ledger_file) {
            (Some(gate), _) => gate.clone(),
            (None, Some(ledger)) => ledger.with_extension("lock"),
            (None, None) => paths.gate_file(),
        }
    }

    pub fn fifo_dir(&self, paths: &Paths) -> PathBuf {
        self.fifo_dir.clone().unwrap_or_else(|| paths.fifo_dir())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
