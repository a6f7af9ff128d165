//! Append-only JSONL record of processed requests and session events.

use crate::OperationsResult;
use chrono::{DateTime, Utc};
use ledger_store::AccountNumber;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use teller_protocol::{RequestKind, Response, Status};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    Request,
    Opened,
    Closed,
    Rejected,
    Alert,
}

/// One line of the transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: LogEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RequestKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
}

impl LogEntry {
    pub fn event(event: LogEvent, slot: Option<usize>, account: Option<AccountNumber>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            slot,
            account,
            kind: None,
            status: None,
            message: message.into(),
            balance: None,
        }
    }

    pub fn request(slot: usize, account: AccountNumber, kind: RequestKind, response: &Response) -> Self {
        Self {
            kind: Some(kind),
            status: Some(response.status()),
            balance: response.balance_value(),
            ..Self::event(LogEvent::Request, Some(slot), Some(account), response.message())
        }
    }
}

/// Appends entries to the transaction log file.
///
/// The file is opened in append mode per entry so other processes may share
/// it. Failures are reported to the caller of [`TransactionLog::try_append`]
/// and swallowed with a warning by [`TransactionLog::append`].
#[derive(Debug)]
pub struct TransactionLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TransactionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &LogEntry) {
        if let Err(e) = self.try_append(entry) {
            warn!(path = %self.path.display(), error = %e, "transaction log write failed");
        }
    }

    pub fn try_append(&self, entry: &LogEntry) -> OperationsResult<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read every entry back. Malformed lines are skipped.
    pub fn read_entries(&self) -> OperationsResult<Vec<LogEntry>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempdir().unwrap();
        let log = TransactionLog::new(dir.path().join("data").join("transacciones.log"));

        log.append(&LogEntry::event(LogEvent::Opened, Some(0), Some(AccountNumber(1001)), "session opened"));
        log.append(&LogEntry::request(
            0,
            AccountNumber(1001),
            RequestKind::Deposit,
            &Response::ok("deposit accepted", dec!(1250.00)),
        ));

        let entries = log.read_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, LogEvent::Opened);
        assert_eq!(entries[1].kind, Some(RequestKind::Deposit));
        assert_eq!(entries[1].status, Some(Status::Ok));
        assert_eq!(entries[1].balance, Some(dec!(1250.00)));
    }

    #[test]
    fn test_lines_are_json_with_rfc3339_timestamp() {
        let dir = tempdir().unwrap();
        let log = TransactionLog::new(dir.path().join("tx.log"));
        log.append(&LogEntry::event(LogEvent::Rejected, None, Some(AccountNumber(7)), "capacity exceeded"));

        let raw = std::fs::read_to_string(log.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(raw.trim()).unwrap();
        assert_eq!(value["event"], "rejected");
        assert_eq!(value["account"], 7);
        assert!(value.get("slot").is_none());
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_unwritable_path_is_not_fatal() {
        let dir = tempdir().unwrap();
        let log = TransactionLog::new(dir.path().to_path_buf());
        let entry = LogEntry::event(LogEvent::Closed, Some(1), None, "closed");

        assert!(log.try_append(&entry).is_err());
        log.append(&entry);
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = tempdir().unwrap();
        let log = TransactionLog::new(dir.path().join("absent.log"));
        assert!(log.read_entries().unwrap().is_empty());
    }
}
