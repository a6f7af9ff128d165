//! Request handling entry point used by the session manager.

use crate::{AlertMonitor, LogEntry, LogEvent, OperationProcessor, TransactionLog};
use ledger_store::{AccountNumber, LedgerResult};
use parking_lot::Mutex;
use teller_protocol::{Request, RequestKind, Response};
use tracing::{info, warn};

/// Processor plus the side channels every request feeds: alert monitor and
/// transaction log.
#[derive(Debug)]
pub struct TellerService {
    processor: OperationProcessor,
    monitor: Mutex<AlertMonitor>,
    log: TransactionLog,
}

impl TellerService {
    pub fn new(processor: OperationProcessor, monitor: AlertMonitor, log: TransactionLog) -> Self {
        Self {
            processor,
            monitor: Mutex::new(monitor),
            log,
        }
    }

    pub fn processor(&self) -> &OperationProcessor {
        &self.processor
    }

    pub fn transaction_log(&self) -> &TransactionLog {
        &self.log
    }

    /// Process one request issued from `slot`.
    pub fn handle(&self, slot: usize, request: &Request) -> Response {
        let response = self.processor.process(request);
        self.log
            .append(&LogEntry::request(slot, request.account, request.kind, &response));

        if response.is_ok() && is_mutation(request.kind) {
            let amount = request.amount.unwrap_or_default();
            let alerts = self.monitor.lock().observe(request.account, request.kind, amount);
            for alert in alerts {
                warn!(slot, account = %alert.account, alert = %alert, "suspicious activity");
                self.log.append(&LogEntry::event(
                    LogEvent::Alert,
                    Some(slot),
                    Some(alert.account),
                    alert.to_string(),
                ));
            }
        }
        response
    }

    /// Check that `account` may open a session: it must exist in the ledger.
    ///
    /// Reads under the gate so a concurrent rewrite is never observed.
    pub fn admit(&self, account: AccountNumber) -> LedgerResult<()> {
        let guard = self.processor.gate().acquire()?;
        let result = self.processor.store().read_balance(account).map(|_| ());
        guard.release();
        result
    }

    pub fn session_opened(&self, slot: usize, account: AccountNumber) {
        info!(slot, %account, "session opened");
        self.log.append(&LogEntry::event(
            LogEvent::Opened,
            Some(slot),
            Some(account),
            "session opened",
        ));
    }

    pub fn session_closed(&self, slot: usize, account: AccountNumber, reason: &str) {
        info!(slot, %account, reason, "session closed");
        self.monitor.lock().reset(account);
        self.log.append(&LogEntry::event(
            LogEvent::Closed,
            Some(slot),
            Some(account),
            reason,
        ));
    }

    pub fn session_rejected(&self, account: AccountNumber, reason: &str) {
        warn!(%account, reason, "session rejected");
        self.log.append(&LogEntry::event(
            LogEvent::Rejected,
            None,
            Some(account),
            reason,
        ));
    }
}

fn is_mutation(kind: RequestKind) -> bool {
    matches!(
        kind,
        RequestKind::Deposit | RequestKind::Withdraw | RequestKind::Transfer
    )
}
