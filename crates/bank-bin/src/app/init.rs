//! Server initialization.

use crate::app::console;
use anyhow::Context;
use bank_config_and_utils::{Config, Paths};
use bank_lifecycle::{acquire_singleton, sweep_stale_channels};
use bank_operations::{AlertMonitor, OperationProcessor, TellerService, TransactionLog};
use ledger_store::{Gate, LedgerStore};
use std::sync::Arc;
use teller_session_manager::{CommandLauncher, ManagerConfig, SessionManager};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Depth of the console-to-manager queue.
const CONNECTION_QUEUE_DEPTH: usize = 16;

/// Run the server until the console or a signal asks it to stop.
pub async fn run_server(config: Config, paths: Paths) -> anyhow::Result<()> {
    paths.ensure_dirs()?;

    let pid_file = paths.pid_file();
    let pid_lock = acquire_singleton(&pid_file).inspect_err(|e| error!(error = %e, "startup refused"))?;
    info!(pid = pid_lock.pid(), "bank server starting");

    let result = serve(&config, &paths).await;

    if let Err(e) = pid_lock.release() {
        warn!(error = %e, "failed to remove PID file");
    }
    info!("bank server stopped");
    result
}

async fn serve(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let manager_config = ManagerConfig::from_config(config, paths);
    let swept = sweep_stale_channels(&manager_config.fifo_dir, &manager_config.base_name)?;
    if swept > 0 {
        info!(count = swept, "removed stale session channels");
    }

    let gate_path = config.gate_file(paths);
    let gate = Gate::open(&gate_path)
        .inspect_err(|e| error!(error = %e, "cannot create gate"))
        .with_context(|| format!("cannot create gate at {}", gate_path.display()))?;

    let store = LedgerStore::new(config.ledger_file(paths));
    let accounts = {
        let _guard = gate.acquire()?;
        store
            .check_accessible()
            .inspect_err(|e| error!(error = %e, "cannot open ledger"))
            .with_context(|| {
                format!(
                    "cannot open ledger at {} (run `teller-bank seed` first?)",
                    store.path().display()
                )
            })?
    };
    info!(path = %store.path().display(), accounts, "ledger opened");

    let service = Arc::new(TellerService::new(
        OperationProcessor::new(store, gate, config.limits.clone()),
        AlertMonitor::new(config.alerts.clone()),
        TransactionLog::new(config.transaction_log_file(paths)),
    ));
    let launcher = Arc::new(CommandLauncher::new(config.client_command.clone()));
    let manager = SessionManager::new(manager_config, service, launcher)?;

    let (tx, rx) = mpsc::channel(CONNECTION_QUEUE_DEPTH);
    let console = console::spawn(tx);

    manager.run(rx, shutdown_signal()).await;
    console.abort();
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "cannot install SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot install SIGINT handler");
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("SIGINT received"),
            Err(e) => {
                warn!(error = %e, "cannot install SIGINT handler");
                sigterm.recv().await;
            }
        },
    }
}
