//! Logging initialization for the bank server and teller client.
//!
//! Thin wrapper over the observability crate. Every process writes
//! structured JSONL to the same file so a whole run can be tailed together.

use observability::LogConfig;
use std::path::Path;

/// Initialize logging for one service.
///
/// * `service_name` - recorded on every line ("bank", "teller")
/// * `level` - default filter, overridden by `RUST_LOG`
/// * `log_path` - JSONL output file
/// * `also_stderr` - mirror lines to stderr for foreground runs
pub fn init_logging(service_name: &str, level: &str, log_path: &Path, also_stderr: bool) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: Some(log_path.to_path_buf()),
        also_stderr,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_json_lines_to_the_given_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("bank.jsonl");

        init_logging("bank", "info", &path, false);
        tracing::warn!(slot = 3, "slot drained");

        let content = std::fs::read_to_string(&path).unwrap();
        let line = content
            .lines()
            .find(|line| line.contains("slot drained"))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["level"], "WARN");
        assert_eq!(value["fields"]["slot"], 3);
    }
}
