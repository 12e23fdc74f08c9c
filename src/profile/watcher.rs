//! Notification of external edits to the profile file.

use super::store::StoreError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Collapses bursts of triggers into one callback.
///
/// The callback runs on a dedicated thread once no trigger has arrived for
/// the debounce window. Dropping the debouncer stops the thread.
#[derive(Debug)]
pub struct Debouncer {
    tx: mpsc::Sender<()>,
}

impl Debouncer {
    pub fn spawn<F>(window: Duration, on_settled: F) -> std::io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<()>();
        thread::Builder::new()
            .name("profile-debounce".to_string())
            .spawn(move || {
                while rx.recv().is_ok() {
                    loop {
                        match rx.recv_timeout(window) {
                            Ok(()) => continue,
                            Err(RecvTimeoutError::Timeout) => {
                                on_settled();
                                break;
                            }
                            Err(RecvTimeoutError::Disconnected) => return,
                        }
                    }
                }
            })?;
        Ok(Self { tx })
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    fn sender(&self) -> mpsc::Sender<()> {
        self.tx.clone()
    }
}

/// Watches the directory of one file and reports debounced changes to it.
pub struct ProfileWatcher {
    _watcher: RecommendedWatcher,
    _debouncer: Debouncer,
    path: PathBuf,
}

impl ProfileWatcher {
    /// Start watching `file`. `on_change` runs once per burst of events.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Watch` if the platform watcher cannot be set up.
    pub fn start<F>(file: &Path, debounce: Duration, on_change: F) -> Result<Self, StoreError>
    where
        F: Fn() + Send + 'static,
    {
        let directory = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name: OsString = file.file_name().map(OsString::from).unwrap_or_default();

        let debouncer = Debouncer::spawn(debounce, on_change).map_err(|source| StoreError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        let tx = debouncer.sender();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_relevant(&event, &file_name) {
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!(error = %e, "profile watcher error"),
        })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        debug!(dir = %directory.display(), "watching profile directory");

        Ok(Self {
            _watcher: watcher,
            _debouncer: debouncer,
            path: file.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}
