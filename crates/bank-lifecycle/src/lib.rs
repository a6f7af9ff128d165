//! Server lifecycle management for the bank server.
//!
//! Handles singleton enforcement through a locked PID file, stale channel
//! cleanup, and stopping a running server from another process.

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Attempts at locking a PID file that is being replaced under us.
const LOCK_ATTEMPTS: usize = 3;

/// Errors from lifecycle management.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("bank server is already running{}", .0.map(|pid| format!(" (pid {pid})")).unwrap_or_default())]
    AlreadyRunning(Option<u32>),
    #[error("bank server is not running")]
    NotRunning,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PID file error: {0}")]
    PidFile(String),
    #[error("failed to signal pid {pid}: {source}")]
    Signal { pid: u32, source: Errno },
}

/// Result of checking whether a server already runs.
#[derive(Debug, PartialEq, Eq)]
pub enum SingletonCheck {
    /// No PID file, safe to start.
    Available,
    /// A PID file exists but no server holds its lock.
    StalePidFile(Option<u32>),
    /// A server holds the PID file lock.
    AlreadyRunning(Option<u32>),
}

/// Outcome of [`stop_server`].
#[derive(Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited after SIGTERM.
    Terminated,
    /// Needed SIGKILL after the grace period.
    Killed,
}

/// Whether `pid` names a live process. `EPERM` counts as alive.
pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// The claimed singleton. The PID file stays locked until release or drop.
#[derive(Debug)]
pub struct PidLock {
    lock: Flock<File>,
    path: PathBuf,
    pid: u32,
}

impl PidLock {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the PID file, then drop the lock.
    pub fn release(self) -> Result<(), LifecycleError> {
        let removed = std::fs::remove_file(&self.path);
        drop(self.lock);
        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Check the PID file for a running server without touching it.
///
/// Liveness is decided by the PID file lock, not by the recorded PID.
pub fn check_singleton(pid_path: &Path) -> Result<SingletonCheck, LifecycleError> {
    let file = match File::open(pid_path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SingletonCheck::Available),
        Err(e) => return Err(e.into()),
    };
    let pid = read_pid_file(pid_path).ok().flatten();
    match Flock::lock(file, FlockArg::LockSharedNonblock) {
        Ok(_unheld) => Ok(SingletonCheck::StalePidFile(pid)),
        Err((_, Errno::EWOULDBLOCK)) => Ok(SingletonCheck::AlreadyRunning(pid)),
        Err((_, errno)) => Err(std::io::Error::from(errno).into()),
    }
}

/// Claim the singleton: lock the PID file and record our PID in it.
///
/// Fails with `AlreadyRunning` while another holder has the lock. A stale
/// file left by a dead server is overwritten.
pub fn acquire_singleton(pid_path: &Path) -> Result<PidLock, LifecycleError> {
    if let Some(parent) = pid_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let Some(mut lock) = lock_pid_file(pid_path)? else {
        return Err(LifecycleError::AlreadyRunning(read_pid_file(pid_path).ok().flatten()));
    };

    let mut previous = String::new();
    lock.read_to_string(&mut previous)?;
    if let Ok(stale_pid) = previous.trim().parse::<u32>() {
        info!(stale_pid, "replacing stale PID file");
    }

    let pid = std::process::id();
    lock.set_len(0)?;
    lock.rewind()?;
    write!(lock, "{}", pid)?;
    lock.sync_all()?;
    debug!(pid, path = %pid_path.display(), "PID file locked");

    Ok(PidLock {
        lock,
        path: pid_path.to_path_buf(),
        pid,
    })
}

/// Remove a PID file no server holds. Returns `false` if one holds it.
pub fn remove_stale_pid_file(pid_path: &Path) -> Result<bool, LifecycleError> {
    if !pid_path.exists() {
        return Ok(true);
    }
    match lock_pid_file(pid_path)? {
        Some(lock) => {
            std::fs::remove_file(pid_path)?;
            drop(lock);
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Take the exclusive lock on the file currently at `pid_path`.
///
/// A holder removes the file before unlocking, so a lock won on an unlinked
/// inode is discarded and retried.
fn lock_pid_file(pid_path: &Path) -> Result<Option<Flock<File>>, LifecycleError> {
    for _ in 0..LOCK_ATTEMPTS {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(pid_path)?;
        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, Errno::EWOULDBLOCK)) => return Ok(None),
            Err((_, Errno::EINTR)) => continue,
            Err((_, errno)) => return Err(std::io::Error::from(errno).into()),
        };

        let held = lock.metadata()?;
        match std::fs::metadata(pid_path) {
            Ok(current) if current.dev() == held.dev() && current.ino() == held.ino() => {
                return Ok(Some(lock));
            }
            Ok(_) => debug!(path = %pid_path.display(), "PID file replaced while locking"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %pid_path.display(), "PID file removed while locking")
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(LifecycleError::PidFile(format!(
        "{} kept changing while locking",
        pid_path.display()
    )))
}

/// Read a PID from the given file.
pub fn read_pid_file(pid_path: &Path) -> Result<Option<u32>, LifecycleError> {
    if !pid_path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(pid_path)?;
    let pid = content
        .trim()
        .parse::<u32>()
        .map_err(|e| LifecycleError::PidFile(format!("invalid PID {:?}: {}", content.trim(), e)))?;
    Ok(Some(pid))
}

/// Whether `file_name` is a session channel for `base_name`:
/// `<base>_<slot>_to_client` or `<base>_<slot>_from_client`.
pub fn is_channel_name(base_name: &str, file_name: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(base_name)
        .and_then(|r| r.strip_prefix('_'))
    else {
        return false;
    };
    let slot = rest
        .strip_suffix("_to_client")
        .or_else(|| rest.strip_suffix("_from_client"));
    matches!(slot, Some(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
}

/// Remove channel objects left behind by a previous run.
///
/// Returns how many were removed. A missing directory counts as clean.
pub fn sweep_stale_channels(dir: &Path, base_name: &str) -> Result<usize, LifecycleError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if is_channel_name(base_name, name) {
            std::fs::remove_file(entry.path())?;
            debug!(path = %entry.path().display(), "removed stale channel");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Send SIGTERM to `pid`, wait up to `grace`, then SIGKILL.
pub async fn stop_server(pid: u32, grace: Duration) -> Result<StopOutcome, LifecycleError> {
    let raw = i32::try_from(pid).map_err(|_| LifecycleError::PidFile(format!("PID {} out of range", pid)))?;
    let target = Pid::from_raw(raw);

    match kill(target, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Err(LifecycleError::NotRunning),
        Err(source) => return Err(LifecycleError::Signal { pid, source }),
    }

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if !process_alive(pid) {
            return Ok(StopOutcome::Terminated);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if !process_alive(pid) {
        return Ok(StopOutcome::Terminated);
    }

    warn!(pid, "server ignored SIGTERM, sending SIGKILL");
    match kill(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(StopOutcome::Killed),
        Err(source) => Err(LifecycleError::Signal { pid, source }),
    }
}

/// Information about a running server.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub pid: Option<u32>,
    pub pid_path: PathBuf,
    running: bool,
}

impl ServerInfo {
    /// Inspect the PID file at `pid_path`.
    pub fn load(pid_path: PathBuf) -> Result<Self, LifecycleError> {
        let (pid, running) = match check_singleton(&pid_path)? {
            SingletonCheck::Available => (None, false),
            SingletonCheck::StalePidFile(pid) => (pid, false),
            SingletonCheck::AlreadyRunning(pid) => (pid, true),
        };
        Ok(Self {
            pid,
            pid_path,
            running,
        })
    }

    /// Whether a server holds the PID file lock.
    pub fn is_running(&self) -> bool {
        self.running
    }
}
