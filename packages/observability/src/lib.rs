//! # Observability
//!
//! Centralized logging layer for the teller-bank workspace.
//!
//! Services are **log producers**. They call `init_with_config` once at
//! startup and use standard `tracing` macros everywhere else. They have no
//! knowledge of where lines end up.
//!
//! Every line is written as structured JSONL to a single file, by default
//! `~/.teller-bank/logs/bank.jsonl`, so that:
//! - `tail -f ~/.teller-bank/logs/bank.jsonl | jq` streams pretty JSON
//! - the server and any teller processes can share one log stream
//!
//! Multi-process safety comes from append-only writes flushed per line.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "bank".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!
//!     tracing::info!("service started");
//! }
//! ```

mod file_writer;

use std::path::PathBuf;

pub use file_writer::{LogFileWriter, WriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "bank", "teller").
    /// Recorded as the root span of every line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.teller-bank/logs/bank.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the logging layer with custom configuration.
///
/// If the log file cannot be opened, file output is skipped and only the
/// stderr layer (forced on in that case) is installed. Calling this twice in
/// one process is a no-op for the second call.
pub fn init_with_config(config: LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let log_path = config.log_path.clone().or_else(default_log_path);

    let file_layer = log_path
        .as_ref()
        .and_then(|path| match LogFileWriter::new(path) {
            Ok(writer) => Some(writer),
            Err(e) => {
                eprintln!("failed to open log file {}: {}", path.display(), e);
                None
            }
        })
        .map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true)
                .with_writer(WriterFactory::new(writer))
                .with_filter(env_filter(&config.default_level))
        });

    let stderr_layer = if config.also_stderr || file_layer.is_none() {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(std::io::stderr)
                .with_filter(env_filter(&config.default_level)),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            service = %config.service_name,
            pid = std::process::id(),
            log_path = ?log_path,
            "observability initialized"
        );
    }
}

/// Central log file location, `~/.teller-bank/logs/bank.jsonl`.
fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".teller-bank").join("logs").join("bank.jsonl"))
}

fn env_filter(default_level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }

    #[test]
    fn test_default_log_path_under_home() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with(".teller-bank/logs/bank.jsonl"));
        }
    }
}
