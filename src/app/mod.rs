//! Interactive console.
//!
//! Wiring lives here so both the binary and the integration tests can build
//! the same pieces from a [`Config`].

mod command;
mod controller;

pub use command::{Command, CommandError, HELP};
pub use controller::{AppEvent, Controller, Flow};

use crate::config::{Config, ProfilesConfig};
use crate::error::AppResult;
use crate::notification::NotificationSink;
use crate::port::PortOpener;
use crate::profile::{executable_dir, ProfileManager, ProfileStore};
use crate::service::{ConnectionManager, PortService, SerialEvent};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Profile store described by the `[profiles]` section.
///
/// `directory` takes precedence over the configured directory; with
/// neither, the file lives next to the executable.
pub fn profile_store(config: &ProfilesConfig, directory: Option<PathBuf>) -> AppResult<ProfileStore> {
    let directory = match directory.or_else(|| config.directory.clone()) {
        Some(dir) => dir,
        None => executable_dir()?,
    };
    Ok(ProfileStore::new(directory.join(&config.file_name))
        .with_lock_timeout(config.lock_timeout())
        .with_backups(config.backup_limit()))
}

/// Build a controller and the receiver for its serial events.
pub fn build_controller(
    config: &Config,
    opener: Arc<dyn PortOpener>,
    profiles: Arc<ProfileManager>,
) -> (Controller, mpsc::Receiver<SerialEvent>) {
    let (serial_tx, serial_rx) = mpsc::channel(config.serial.event_capacity);
    let service =
        PortService::new(serial_tx).with_read_buffer_size(config.serial.read_buffer_size);
    let connection =
        ConnectionManager::new(opener, service).with_read_timeout(config.serial.read_timeout());
    let controller = Controller::new(
        connection,
        profiles,
        config.messaging.display_mode(),
        config.notifications.capacity,
    );
    (controller, serial_rx)
}

/// Forward lines from `input` as commands until it ends or the loop goes away.
///
/// End of input is reported as `:quit`. Unparseable commands are posted to
/// `sink` and skipped.
pub fn forward_lines<R: BufRead>(
    input: R,
    events: &mpsc::UnboundedSender<AppEvent>,
    sink: &NotificationSink,
) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "console input failed");
                break;
            }
        };
        match Command::parse(&line) {
            Ok(Some(command)) => {
                if events.send(AppEvent::Command(command)).is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => sink.error(e.to_string()),
        }
    }
    let _ = events.send(AppEvent::Command(Command::Quit));
}
