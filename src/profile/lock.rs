//! Cross-process named lock backed by an exclusive lock on a lock file.

use super::store::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Held lock. Released on drop.
#[derive(Debug)]
pub struct NamedLock {
    file: File,
    path: PathBuf,
}

impl NamedLock {
    /// Acquire `<dir>/<name>.lock`, polling until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - `StoreError::LockTimeout` if another holder keeps the lock past `timeout`
    /// - `StoreError::Io` if the lock file cannot be created
    pub fn acquire(dir: &Path, name: &str, timeout: Duration) -> Result<Self, StoreError> {
        let path = dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!(lock = %path.display(), "profile lock acquired");
                    return Ok(Self { file, path });
                }
                Err(e) if is_contended(&e) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::LockTimeout {
                            name: name.to_string(),
                            timeout,
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for NamedLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(lock = %self.path.display(), "profile lock released");
    }
}
