//! Named-pipe channel objects for one slot.

use crate::{SessionError, SessionResult};
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::unix::pipe;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Filesystem paths of a slot's two channels. Deterministic per slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPaths {
    /// Server writes, client reads.
    pub to_client: PathBuf,
    /// Client writes, server reads.
    pub from_client: PathBuf,
}

impl ChannelPaths {
    pub fn for_slot(dir: &Path, base_name: &str, slot: usize) -> Self {
        Self {
            to_client: dir.join(format!("{}_{}_to_client", base_name, slot)),
            from_client: dir.join(format!("{}_{}_from_client", base_name, slot)),
        }
    }

    /// Unlink any previous objects at both paths and create fresh FIFOs.
    ///
    /// On failure nothing is left behind.
    pub fn create(&self) -> SessionResult<()> {
        for path in [&self.to_client, &self.from_client] {
            let result = remove_path(path).and_then(|()| {
                mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(io::Error::from)
            });
            if let Err(source) = result {
                self.remove();
                return Err(SessionError::Channel {
                    path: path.clone(),
                    source,
                });
            }
        }
        debug!(to_client = %self.to_client.display(), from_client = %self.from_client.display(), "channels created");
        Ok(())
    }

    /// Remove both channel objects, ignoring ones already gone.
    pub fn remove(&self) {
        for path in [&self.to_client, &self.from_client] {
            if let Err(e) = remove_path(path) {
                warn!(path = %path.display(), error = %e, "failed to remove channel");
            }
        }
    }

    pub fn exists(&self) -> bool {
        self.to_client.exists() || self.from_client.exists()
    }

    /// Open the inbound read end. Never blocks, even without a writer.
    pub fn open_inbound(&self) -> SessionResult<pipe::Receiver> {
        pipe::OpenOptions::new()
            .open_receiver(&self.from_client)
            .map_err(|source| SessionError::Channel {
                path: self.from_client.clone(),
                source,
            })
    }
}

/// Open the write end of `path`, retrying until a reader appears.
///
/// A non-blocking open for writing fails with `ENXIO` while no process has
/// the FIFO open for reading.
pub async fn open_outbound(path: &Path, timeout: Duration, retry: Duration) -> SessionResult<pipe::Sender> {
    let deadline = Instant::now() + timeout;
    loop {
        match pipe::OpenOptions::new().open_sender(path) {
            Ok(sender) => return Ok(sender),
            Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => {
                if Instant::now() >= deadline {
                    return Err(SessionError::OpenTimeout {
                        path: path.to_path_buf(),
                        timeout,
                    });
                }
                tokio::time::sleep(retry).await;
            }
            Err(source) => {
                return Err(SessionError::Channel {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::FileTypeExt;
    use tempfile::tempdir;

    #[test]
    fn test_paths_are_deterministic() {
        let paths = ChannelPaths::for_slot(Path::new("/run/bank"), "banco_fifo", 3);
        assert_eq!(paths.to_client, PathBuf::from("/run/bank/banco_fifo_3_to_client"));
        assert_eq!(paths.from_client, PathBuf::from("/run/bank/banco_fifo_3_from_client"));
    }

    #[test]
    fn test_create_replaces_stale_objects() {
        let dir = tempdir().unwrap();
        let paths = ChannelPaths::for_slot(dir.path(), "t", 0);
        std::fs::write(&paths.to_client, b"stale").unwrap();

        paths.create().unwrap();

        for path in [&paths.to_client, &paths.from_client] {
            let kind = std::fs::metadata(path).unwrap().file_type();
            assert!(kind.is_fifo());
        }

        paths.remove();
        assert!(!paths.exists());
        paths.remove();
    }

    #[test]
    fn test_create_in_missing_dir_fails_cleanly() {
        let dir = tempdir().unwrap();
        let paths = ChannelPaths::for_slot(&dir.path().join("missing"), "t", 1);

        let err = paths.create().unwrap_err();
        assert!(matches!(err, SessionError::Channel { .. }));
        assert!(!paths.exists());
    }

    #[tokio::test]
    async fn test_open_outbound_times_out_without_reader() {
        let dir = tempdir().unwrap();
        let paths = ChannelPaths::for_slot(dir.path(), "t", 2);
        paths.create().unwrap();

        let err = open_outbound(
            &paths.to_client,
            Duration::from_millis(50),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::OpenTimeout { .. }));
    }

    #[tokio::test]
    async fn test_open_outbound_succeeds_with_reader() {
        let dir = tempdir().unwrap();
        let paths = ChannelPaths::for_slot(dir.path(), "t", 4);
        paths.create().unwrap();

        let _reader = pipe::OpenOptions::new().open_receiver(&paths.to_client).unwrap();
        let sender = open_outbound(
            &paths.to_client,
            Duration::from_millis(200),
            Duration::from_millis(10),
        )
        .await;
        assert!(sender.is_ok());
    }
}
