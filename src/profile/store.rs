//! Durable storage of the profile set.
//!
//! Every save holds the named lock, writes `<file>.tmp`, re-reads it to
//! verify, backs up the current file and finally renames the temp file over
//! the live one. A reader never observes a partially written file.

use super::backup::{self, BACKUP_DIR_NAME};
use super::lock::NamedLock;
use super::model::ProfileSet;
use super::{DEFAULT_LOCK_TIMEOUT, DEFAULT_MAX_BACKUPS, LOCK_NAME, PROFILE_FILE_NAME};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Timed out after {timeout:?} waiting for profile lock '{name}'")]
    LockTimeout { name: String, timeout: Duration },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize profiles: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to parse profile file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Profile file '{path}' failed verification: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl StoreError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Removes the temp file unless it was renamed into place.
struct TempFile<'a>(&'a Path);

impl Drop for TempFile<'_> {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = fs::remove_file(self.0) {
                warn!(path = %self.0.display(), error = %e, "failed to remove temp file");
            }
        }
    }
}

/// Directory of the running executable, the default home of the profile file.
pub fn executable_dir() -> Result<PathBuf, StoreError> {
    let exe = std::env::current_exe().map_err(|source| StoreError::Io {
        path: PathBuf::from("<current executable>"),
        source,
    })?;
    Ok(exe.parent().map(Path::to_path_buf).unwrap_or_default())
}

/// Location and write policy of a profile file.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
    lock_dir: PathBuf,
    lock_name: String,
    lock_timeout: Duration,
    max_backups: Option<usize>,
}

impl ProfileStore {
    /// Store backed by `path` with default lock and backup settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_dir: std::env::temp_dir(),
            lock_name: LOCK_NAME.to_string(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_backups: Some(DEFAULT_MAX_BACKUPS),
        }
    }

    /// Store for the standard file name inside `dir`.
    pub fn in_directory(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(PROFILE_FILE_NAME))
    }

    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    pub fn with_lock_name(mut self, name: impl Into<String>) -> Self {
        self.lock_name = name.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Keep at most `max` backups, or none at all with `None`.
    pub fn with_backups(mut self, max: Option<usize>) -> Self {
        self.max_backups = max;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    pub fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.directory().join(BACKUP_DIR_NAME)
    }

    pub fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Parse the file as is, without filtering.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` if the file cannot be read
    /// - `StoreError::Parse` if it is not a valid profile document
    pub fn read(&self) -> Result<ProfileSet, StoreError> {
        let content = fs::read_to_string(&self.path).map_err(StoreError::io(&self.path))?;
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Parse the file, dropping entries that are not usable profiles.
    ///
    /// Returns the remaining profiles as stored, without adding `Default`,
    /// and the names that were dropped.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` if the file cannot be read
    /// - `StoreError::Parse` if it is not a profile document at all
    pub fn read_filtered(&self) -> Result<(ProfileSet, Vec<String>), StoreError> {
        let content = fs::read_to_string(&self.path).map_err(StoreError::io(&self.path))?;
        ProfileSet::from_json_filtered(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Profiles on disk for startup, before `Default` is guaranteed. Never fails.
    ///
    /// A missing, empty or unreadable file yields the default set; invalid
    /// entries are dropped with a warning.
    pub fn load_entries(&self) -> ProfileSet {
        if !self.exists() {
            info!(path = %self.path.display(), "profile file not found, using defaults");
            return ProfileSet::default();
        }

        let (set, dropped) = match self.read_filtered() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "profile file unreadable, using defaults");
                return ProfileSet::default();
            }
        };
        for name in dropped {
            warn!(profile = %name, "dropping invalid profile");
        }

        if set.is_empty() {
            info!("profile file holds no usable profiles, using defaults");
            return ProfileSet::default();
        }
        debug!(profiles = set.len(), "profiles loaded");
        set
    }

    /// Load for startup. Never fails, and the result always holds `Default`.
    pub fn load(&self) -> ProfileSet {
        let mut set = self.load_entries();
        set.ensure_default();
        set
    }

    /// Persist `set` atomically under the named lock.
    ///
    /// # Errors
    ///
    /// - `StoreError::LockTimeout` if the lock is not acquired in time
    /// - `StoreError::Corrupted` if the written temp file does not read back as `set`
    /// - `StoreError::Io`/`Serialize` for write failures
    ///
    /// On error the live file is untouched and the temp file is removed.
    pub fn save(&self, set: &ProfileSet) -> Result<(), StoreError> {
        self.save_with(set, |_| {})
    }

    /// `save` with a hook that runs on the temp file before verification.
    pub(crate) fn save_with<F>(&self, set: &ProfileSet, before_verify: F) -> Result<(), StoreError>
    where
        F: FnOnce(&Path),
    {
        let _lock = NamedLock::acquire(&self.lock_dir, &self.lock_name, self.lock_timeout)?;

        let directory = self.directory();
        fs::create_dir_all(directory).map_err(StoreError::io(directory))?;

        let temp_path = self.temp_path();
        let _temp = TempFile(&temp_path);

        let json = serde_json::to_string_pretty(set).map_err(StoreError::Serialize)?;
        write_synced(&temp_path, json.as_bytes())?;
        before_verify(&temp_path);
        self.verify(&temp_path, set)?;

        if let Some(keep) = self.max_backups {
            if self.exists() {
                let backup_dir = self.backup_dir();
                if let Err(e) = backup::create_backup(&self.path, &backup_dir) {
                    warn!(error = %e, "failed to back up profile file");
                }
                let pruned = backup::prune_backups(&self.path, &backup_dir, keep);
                if pruned > 0 {
                    debug!(pruned, "old profile backups removed");
                }
            }
        }

        fs::rename(&temp_path, &self.path).map_err(StoreError::io(&self.path))?;
        info!(path = %self.path.display(), profiles = set.len(), "profiles saved");
        Ok(())
    }

    fn verify(&self, temp_path: &Path, expected: &ProfileSet) -> Result<(), StoreError> {
        let content = fs::read_to_string(temp_path).map_err(StoreError::io(temp_path))?;
        let parsed: ProfileSet =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupted {
                path: temp_path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if &parsed != expected {
            return Err(StoreError::Corrupted {
                path: temp_path.to_path_buf(),
                reason: "content differs from what was written".to_string(),
            });
        }
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = fs::File::create(path).map_err(StoreError::io(path))?;
    file.write_all(bytes).map_err(StoreError::io(path))?;
    file.sync_all().map_err(StoreError::io(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SerialProfile;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ProfileStore {
        ProfileStore::in_directory(dir.path())
            .with_lock_dir(dir.path())
            .with_lock_name("test.profiles")
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = TempDir::new().unwrap();
        let set = store(&dir).load();
        assert_eq!(set, ProfileSet::default());
    }

    #[test]
    fn test_load_corrupt_file_gives_default() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.read(), Err(StoreError::Parse { .. })));
        assert_eq!(store.load(), ProfileSet::default());
    }

    #[test]
    fn test_load_empty_profiles_gives_default() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), r#"{"Profiles": {}, "DefaultProfileName": "X"}"#).unwrap();
        assert_eq!(store.load(), ProfileSet::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut set = ProfileSet::default();
        set.upsert(
            "Lab",
            SerialProfile {
                port_name: Some("COM3".to_string()),
                baud_rate: 9600,
                ..SerialProfile::default()
            },
        )
        .unwrap();
        set.mark_default("Lab").unwrap();

        store.save(&set).unwrap();
        assert_eq!(store.load(), set);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_load_keeps_valid_entries_beside_out_of_range_ones() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(
            store.path(),
            r#"{"Profiles": {
                "Good": {"PortName": "COM1", "BaudRate": 38400, "DataBits": 7},
                "Huge": {"PortName": "COM2", "BaudRate": 9600, "DataBits": 300}
            }, "DefaultProfileName": "Good"}"#,
        )
        .unwrap();

        let set = store.load();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["Default", "Good"]);
        assert_eq!(set.default_profile_name, "Good");
        assert_eq!(store.read_filtered().unwrap().1, vec!["Huge".to_string()]);
    }

    #[test]
    fn test_load_entries_does_not_add_default() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(
            store.path(),
            r#"{"Profiles": {"Lab": {"BaudRate": 9600}}, "DefaultProfileName": "Gone"}"#,
        )
        .unwrap();
        assert_eq!(store.load_entries().names().collect::<Vec<_>>(), vec!["Lab"]);
        assert!(store.load().contains("Default"));
    }

    #[test]
    fn test_failed_verification_leaves_live_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(&ProfileSet::default()).unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        let mut changed = ProfileSet::default();
        changed
            .upsert(
                "Lab",
                SerialProfile {
                    baud_rate: 9600,
                    ..SerialProfile::default()
                },
            )
            .unwrap();

        // Truncated write.
        let result = store.save_with(&changed, |temp| {
            fs::write(temp, "{ \"Profiles\": ").unwrap();
        });
        assert!(matches!(result, Err(StoreError::Corrupted { .. })));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
        assert!(!store.temp_path().exists());

        // Well-formed but different content.
        let result = store.save_with(&changed, |temp| {
            let json = serde_json::to_string(&ProfileSet::default()).unwrap();
            fs::write(temp, json).unwrap();
        });
        match result {
            Err(StoreError::Corrupted { reason, .. }) => assert!(reason.contains("differs")),
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
        assert!(!store.temp_path().exists());
        assert!(backup::list_backups(store.path(), &store.backup_dir()).is_empty());
    }

    #[test]
    fn test_first_save_makes_no_backup() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(&ProfileSet::default()).unwrap();
        assert!(backup::list_backups(store.path(), &store.backup_dir()).is_empty());

        store.save(&ProfileSet::default()).unwrap();
        assert_eq!(backup::list_backups(store.path(), &store.backup_dir()).len(), 1);
    }

    #[test]
    fn test_backups_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).with_backups(None);
        store.save(&ProfileSet::default()).unwrap();
        store.save(&ProfileSet::default()).unwrap();
        assert!(!store.backup_dir().exists());
    }

    #[test]
    fn test_save_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::in_directory(dir.path().join("nested/deeper"))
            .with_lock_dir(dir.path())
            .with_lock_name("nested");
        store.save(&ProfileSet::default()).unwrap();
        assert!(store.exists());
    }

    #[test]
    fn test_temp_path() {
        let store = ProfileStore::new("/data/SerialPortConfig.json");
        assert_eq!(store.temp_path(), PathBuf::from("/data/SerialPortConfig.json.tmp"));
        assert_eq!(store.backup_dir(), PathBuf::from("/data/Backups"));
    }
}
