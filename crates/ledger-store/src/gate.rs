//! Cross-process mutual exclusion for ledger access.
//!
//! The gate is an exclusive `flock` on a lock file next to the ledger. Each
//! acquisition opens its own file description, so two threads of one
//! process exclude each other exactly like two processes do, and the kernel
//! drops the lock if the holder dies.

use crate::{LedgerError, LedgerResult};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Named binary lock guarding every ledger read-modify-write sequence.
#[derive(Debug, Clone)]
pub struct Gate {
    path: PathBuf,
}

impl Gate {
    /// Open (creating if needed) the gate at `path`.
    ///
    /// Fails when the lock file cannot be created, which is a startup error.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let gate = Self { path: path.into() };
        if let Some(parent) = gate.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| gate.error(source))?;
            }
        }
        gate.open_file()?;
        Ok(gate)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the gate is held.
    pub fn acquire(&self) -> LedgerResult<GateGuard> {
        let mut file = self.open_file()?;
        loop {
            match Flock::lock(file, FlockArg::LockExclusive) {
                Ok(lock) => {
                    trace!(path = %self.path.display(), "gate acquired");
                    return Ok(GateGuard { _lock: lock });
                }
                Err((returned, Errno::EINTR)) => file = returned,
                Err((_, errno)) => return Err(self.error(errno.into())),
            }
        }
    }

    /// Take the gate only if nobody holds it.
    pub fn try_acquire(&self) -> LedgerResult<Option<GateGuard>> {
        let file = self.open_file()?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => Ok(Some(GateGuard { _lock: lock })),
            Err((_, Errno::EWOULDBLOCK)) => Ok(None),
            Err((_, errno)) => Err(self.error(errno.into())),
        }
    }

    fn open_file(&self) -> LedgerResult<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| self.error(source))
    }

    fn error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Gate {
            path: self.path.clone(),
            source,
        }
    }
}

/// Proof of gate ownership. Dropping it releases the gate.
#[derive(Debug)]
pub struct GateGuard {
    _lock: Flock<File>,
}

impl GateGuard {
    /// Release the gate explicitly.
    pub fn release(self) {
        drop(self);
    }
}
