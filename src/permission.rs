//! Filesystem access probes for the profile directory.
//!
//! Every check answers with a plain `bool`; failures are logged at debug
//! level and never propagate.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// True if `dir` exists, can be listed, and a probe file can be created and removed in it.
pub fn check_directory_writable(dir: &Path) -> bool {
    if dir.as_os_str().is_empty() || !dir.is_dir() {
        return false;
    }
    match probe_directory(dir) {
        Ok(()) => true,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "directory not writable");
            false
        }
    }
}

fn probe_directory(dir: &Path) -> io::Result<()> {
    let _ = fs::read_dir(dir)?.next();
    let probe = dir.join(format!(".test_{}.tmp", Uuid::new_v4()));
    fs::write(&probe, b"test")?;
    fs::remove_file(&probe)
}

/// True if `file` can be opened for reading and writing.
///
/// A file that does not exist yet is judged by its parent directory.
pub fn check_file_permissions(file: &Path) -> bool {
    if file.as_os_str().is_empty() {
        return false;
    }
    if !file.exists() {
        return match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => check_directory_writable(parent),
            _ => false,
        };
    }
    match OpenOptions::new().read(true).write(true).open(file) {
        Ok(_) => true,
        Err(e) => {
            debug!(file = %file.display(), error = %e, "file not writable");
            false
        }
    }
}

/// Create `dir` if needed and report whether it is writable.
pub fn ensure_directory(dir: &Path) -> bool {
    if dir.as_os_str().is_empty() {
        return false;
    }
    if let Err(e) = fs::create_dir_all(dir) {
        debug!(dir = %dir.display(), error = %e, "cannot create directory");
        return false;
    }
    check_directory_writable(dir)
}
