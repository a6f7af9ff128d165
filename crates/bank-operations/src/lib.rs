//! Bank operations: applies teller requests to the ledger.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Session Manager                          │
//! │                                                               │
//! │  frame ──► teller_protocol::decode ──► TellerService::handle  │
//! │                                              │                │
//! │                        ┌─────────────────────┼──────────┐     │
//! │                        ▼                     ▼          ▼     │
//! │               OperationProcessor      AlertMonitor  TransactionLog
//! │                        │                                      │
//! │              Gate ──► LedgerStore::apply                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bank_operations::{OperationProcessor, TellerService, TransactionLog, AlertMonitor};
//!
//! let processor = OperationProcessor::new(store, gate, LimitsConfig::default());
//! let service = TellerService::new(
//!     processor,
//!     AlertMonitor::new(AlertConfig::default()),
//!     TransactionLog::new("data/transacciones.log"),
//! );
//!
//! let response = service.handle(0, &request);
//! ```

mod error;
mod monitor;
mod processor;
mod service;
mod transaction_log;

pub use error::{OperationsError, OperationsResult};
pub use monitor::{Alert, AlertKind, AlertMonitor};
pub use processor::{messages, OperationProcessor};
pub use service::TellerService;
pub use transaction_log::{LogEntry, LogEvent, TransactionLog};
