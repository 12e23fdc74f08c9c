//! Named serial profiles persisted as one JSON document.
//!
//! The file (`SerialPortConfig.json` by default) lives next to the
//! executable unless configured otherwise:
//!
//! ```json
//! {
//!   "Profiles": {
//!     "Default": { "PortName": null, "BaudRate": 115200, "DataBits": 8,
//!                  "StopBits": "One", "Parity": "None" }
//!   },
//!   "DefaultProfileName": "Default"
//! }
//! ```
//!
//! Writes are atomic and serialized across processes by a named lock, and
//! each overwrite leaves a timestamped copy under `Backups/`.

pub mod backup;
mod lock;
mod manager;
mod model;
mod store;
mod watcher;

use std::time::Duration;

pub use lock::NamedLock;
pub use manager::{ProfileManager, ReloadOutcome};
pub use model::{
    ProfileError, ProfileSet, SerialProfile, DEFAULT_PROFILE_NAME, SUPPORTED_BAUD_RATES,
    SUPPORTED_DATA_BITS,
};
pub use store::{executable_dir, ProfileStore, StoreError};
pub use watcher::{Debouncer, ProfileWatcher};

/// File name of the profile document.
pub const PROFILE_FILE_NAME: &str = "SerialPortConfig.json";

/// Versioned name of the cross-process lock guarding the profile file.
pub const LOCK_NAME: &str = "serialdesk.profiles.v1";

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BACKUPS: usize = 10;
pub const DEFAULT_WATCH_DEBOUNCE: Duration = Duration::from_millis(500);
