//! Operator console: the connection source fed from stdin.

use ledger_store::AccountNumber;
use teller_session_manager::ConnectionRequest;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// One parsed console line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ConsoleInput {
    Open(AccountNumber),
    Shutdown,
    Blank,
    Invalid(String),
}

pub(crate) fn parse_line(line: &str) -> ConsoleInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ConsoleInput::Blank;
    }
    match trimmed.parse::<AccountNumber>() {
        Ok(account) if account.get() == 0 => ConsoleInput::Shutdown,
        Ok(account) => ConsoleInput::Open(account),
        Err(_) => ConsoleInput::Invalid(trimmed.to_string()),
    }
}

/// Read account numbers from stdin and forward them to the manager.
///
/// Ends after a shutdown request, at end of input, or once the manager
/// stops listening.
pub(crate) fn spawn(tx: mpsc::Sender<ConnectionRequest>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("Enter an account number to open a teller session, 0 to shut down.");

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("console input closed");
                    return;
                }
                Err(e) => {
                    debug!(error = %e, "console read failed");
                    return;
                }
            };

            let request = match parse_line(&line) {
                ConsoleInput::Blank => continue,
                ConsoleInput::Invalid(text) => {
                    println!("Not an account number: {text}");
                    continue;
                }
                ConsoleInput::Open(account) => ConnectionRequest::Open(account),
                ConsoleInput::Shutdown => ConnectionRequest::Shutdown,
            };
            let stop = request == ConnectionRequest::Shutdown;
            if tx.send(request).await.is_err() || stop {
                return;
            }
        }
    })
}
