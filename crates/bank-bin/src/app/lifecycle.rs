//! Server lifecycle subcommands (stop, status).

use bank_config_and_utils::{Config, Paths};
use bank_lifecycle::{remove_stale_pid_file, stop_server, LifecycleError, ServerInfo, StopOutcome};
use std::time::Duration;

/// Extra time on top of the session shutdown timeout before SIGKILL.
const STOP_GRACE_MARGIN: Duration = Duration::from_secs(2);

/// Stop the running server.
pub async fn stop_running(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let info = ServerInfo::load(paths.pid_file())?;
    let pid = match info.pid {
        Some(pid) if info.is_running() => pid,
        None if info.is_running() => {
            anyhow::bail!("bank server is starting and has not recorded its PID yet, try again");
        }
        _ if info.pid_path.exists() => {
            if remove_stale_pid_file(&info.pid_path)? {
                println!("Bank server is not running (stale PID file removed)");
            } else {
                println!("Bank server started meanwhile, run stop again");
            }
            return Ok(());
        }
        _ => {
            println!("Bank server is not running");
            return Ok(());
        }
    };

    match stop_server(pid, config.shutdown_timeout() + STOP_GRACE_MARGIN).await {
        Ok(StopOutcome::Terminated) => println!("Bank server stopped (pid {pid})"),
        Ok(StopOutcome::Killed) => {
            println!("Bank server did not stop gracefully, killed (pid {pid})");
            let _ = remove_stale_pid_file(&info.pid_path);
        }
        Err(LifecycleError::NotRunning) => println!("Bank server is not running"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Print server status.
pub fn check_status(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let info = ServerInfo::load(paths.pid_file())?;
    match info.pid {
        Some(pid) if info.is_running() => println!("Bank server is running (pid {pid})"),
        None if info.is_running() => println!("Bank server is starting"),
        Some(pid) => println!("Bank server is not running (stale PID file for pid {pid})"),
        None => println!("Bank server is not running"),
    }
    println!("Ledger:   {}", config.ledger_file(paths).display());
    println!("Channels: {}", config.fifo_dir(paths).display());
    println!("Sessions: up to {}", config.max_sessions);
    Ok(())
}
