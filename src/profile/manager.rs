//! In-memory profile set, current selection and their persistence.

use super::model::{ProfileError, ProfileSet, SerialProfile, DEFAULT_PROFILE_NAME};
use super::store::ProfileStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Result of reconciling memory with the file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A delete was in progress.
    Skipped,
    /// The file no longer exists; memory kept.
    Missing,
    /// The file could not be read; memory kept.
    Failed(String),
    Reloaded {
        selected: String,
        selection_changed: bool,
        dropped: Vec<String>,
    },
}

struct Selection {
    set: ProfileSet,
    selected: String,
}

/// Shared, thread-safe owner of the profile set.
///
/// Mutations update memory first and then write the whole set through the
/// store. A failed write keeps the in-memory change.
pub struct ProfileManager {
    store: ProfileStore,
    inner: Mutex<Selection>,
    reload_lock: Mutex<()>,
    deleting: AtomicBool,
}

struct DeleteGuard<'a>(&'a AtomicBool);

impl<'a> DeleteGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for DeleteGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ProfileManager {
    /// Load the set from `store` and select the configured default.
    pub fn open(store: ProfileStore) -> Self {
        // Selection runs before `Default` is guaranteed, so a file without
        // one falls back to its alphabetically first profile.
        let mut set = store.load_entries();
        let selected = set.fallback_selection();
        set.ensure_default();
        info!(profiles = set.len(), selected = %selected, "profiles ready");
        Self {
            store,
            inner: Mutex::new(Selection { set, selected }),
            reload_lock: Mutex::new(()),
            deleting: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn snapshot(&self) -> ProfileSet {
        self.inner.lock().set.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.lock().set.names().map(str::to_string).collect()
    }

    pub fn selected(&self) -> String {
        self.inner.lock().selected.clone()
    }

    /// Settings of the selected profile.
    pub fn selected_profile(&self) -> SerialProfile {
        let inner = self.inner.lock();
        inner.set.get(&inner.selected).cloned().unwrap_or_default()
    }

    pub fn default_name(&self) -> String {
        self.inner.lock().set.default_profile_name.clone()
    }

    pub fn get(&self, name: &str) -> Option<SerialProfile> {
        self.inner.lock().set.get(name).cloned()
    }

    /// Make `name` the selected profile and return its settings.
    pub fn select(&self, name: &str) -> Result<SerialProfile, ProfileError> {
        let mut inner = self.inner.lock();
        let profile = inner
            .set
            .get(name)
            .cloned()
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        inner.selected = name.to_string();
        debug!(profile = name, "profile selected");
        Ok(profile)
    }

    /// Create or overwrite `name`, select it and persist the set.
    ///
    /// Returns the trimmed name the profile was stored under.
    ///
    /// # Errors
    ///
    /// - `ProfileError::EmptyName` / `Invalid` before anything changes
    /// - `ProfileError::Store` if the write fails (memory keeps the change)
    pub fn save_profile(&self, name: &str, profile: SerialProfile) -> Result<String, ProfileError> {
        let (name, snapshot) = {
            let mut inner = self.inner.lock();
            let name = inner.set.upsert(name, profile)?;
            inner.selected = name.clone();
            (name, inner.set.clone())
        };
        self.store.save(&snapshot)?;
        info!(profile = %name, "profile saved");
        Ok(name)
    }

    /// Save `name` with `profile`, mark it as default and persist.
    pub fn mark_default(&self, name: &str, profile: SerialProfile) -> Result<String, ProfileError> {
        let (name, snapshot) = {
            let mut inner = self.inner.lock();
            let name = inner.set.upsert(name, profile)?;
            inner.set.mark_default(&name)?;
            inner.selected = name.clone();
            (name, inner.set.clone())
        };
        self.store.save(&snapshot)?;
        info!(profile = %name, "default profile changed");
        Ok(name)
    }

    /// Delete `name` and persist. Returns the profile selected afterwards.
    ///
    /// # Errors
    ///
    /// - `ProfileError::Protected` for `Default`; nothing changes
    /// - `ProfileError::NotFound` if no such profile exists
    /// - `ProfileError::Store` if the write fails
    pub fn delete(&self, name: &str) -> Result<String, ProfileError> {
        if name == DEFAULT_PROFILE_NAME {
            return Err(ProfileError::Protected);
        }

        let _deleting = DeleteGuard::enter(&self.deleting);
        let _reload = self.reload_lock.lock();

        let (selected, snapshot) = {
            let mut inner = self.inner.lock();
            inner.set.remove(name)?;
            if inner.selected == name || !inner.set.contains(&inner.selected) {
                inner.selected = inner.set.fallback_selection();
            }
            (inner.selected.clone(), inner.set.clone())
        };
        self.store.save(&snapshot)?;
        info!(profile = name, selected = %selected, "profile deleted");
        Ok(selected)
    }

    /// Write the current set without changing it.
    pub fn persist(&self) -> Result<(), ProfileError> {
        let snapshot = self.snapshot();
        self.store.save(&snapshot)?;
        Ok(())
    }

    /// Replace memory with the file's contents after an external change.
    ///
    /// The selection is kept when it still exists, otherwise it falls back
    /// to the configured default.
    pub fn reload_from_disk(&self) -> ReloadOutcome {
        if self.deleting.load(Ordering::SeqCst) {
            debug!("reload skipped, delete in progress");
            return ReloadOutcome::Skipped;
        }
        let _reload = self.reload_lock.lock();
        if self.deleting.load(Ordering::SeqCst) {
            return ReloadOutcome::Skipped;
        }

        if !self.store.exists() {
            warn!(path = %self.store.path().display(), "profile file disappeared, keeping profiles in memory");
            return ReloadOutcome::Missing;
        }

        let (mut set, mut dropped) = match self.store.read_filtered() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "profile reload failed, keeping profiles in memory");
                return ReloadOutcome::Failed(e.to_string());
            }
        };
        dropped.extend(set.normalize());
        dropped.sort();
        for name in &dropped {
            warn!(profile = %name, "dropping invalid profile");
        }

        let mut inner = self.inner.lock();
        let previous = inner.selected.clone();
        inner.set = set;
        if !inner.set.contains(&previous) {
            inner.selected = inner.set.fallback_selection();
            info!(
                previous = %previous,
                selected = %inner.selected,
                "selected profile was removed externally"
            );
        }
        let selected = inner.selected.clone();
        info!(profiles = inner.set.len(), "profiles reloaded from disk");

        ReloadOutcome::Reloaded {
            selection_changed: selected != previous,
            selected,
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> ProfileManager {
        ProfileManager::open(
            ProfileStore::in_directory(dir.path())
                .with_lock_dir(dir.path())
                .with_lock_name("manager.test"),
        )
    }

    fn lab() -> SerialProfile {
        SerialProfile {
            port_name: Some("/dev/ttyUSB1".to_string()),
            baud_rate: 9600,
            ..SerialProfile::default()
        }
    }

    #[test]
    fn test_open_selects_default() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        assert_eq!(manager.selected(), "Default");
        assert_eq!(manager.names(), vec!["Default".to_string()]);
    }

    #[test]
    fn test_open_falls_back_to_first_profile_without_default() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(crate::profile::PROFILE_FILE_NAME),
            r#"{"Profiles": {
                "Zeta": {"PortName": "COM2", "BaudRate": 115200},
                "Alpha": {"PortName": "COM1", "BaudRate": 9600}
            }, "DefaultProfileName": "Gone"}"#,
        )
        .unwrap();

        let manager = manager(&dir);
        assert_eq!(manager.selected(), "Alpha");
        assert_eq!(manager.selected_profile().baud_rate, 9600);
        assert_eq!(
            manager.names(),
            vec!["Alpha".to_string(), "Default".to_string(), "Zeta".to_string()]
        );
    }

    #[test]
    fn test_reload_reports_dropped_entries() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_profile("Lab", lab()).unwrap();
        std::fs::write(
            manager.store().path(),
            r#"{"Profiles": {
                "Lab": {"PortName": "/dev/ttyUSB1", "BaudRate": 9600},
                "Wide": {"BaudRate": 9600, "DataBits": 300},
                "Zero": {"BaudRate": 0}
            }, "DefaultProfileName": "Lab"}"#,
        )
        .unwrap();

        assert_eq!(
            manager.reload_from_disk(),
            ReloadOutcome::Reloaded {
                selected: "Lab".to_string(),
                selection_changed: false,
                dropped: vec!["Wide".to_string(), "Zero".to_string()],
            }
        );
        assert_eq!(
            manager.names(),
            vec!["Default".to_string(), "Lab".to_string()]
        );
    }

    #[test]
    fn test_save_selects_and_persists() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        assert_eq!(manager.save_profile(" Lab ", lab()).unwrap(), "Lab");
        assert_eq!(manager.selected(), "Lab");
        assert_eq!(manager.store().read().unwrap().get("Lab"), Some(&lab()));
    }

    #[test]
    fn test_select_unknown_profile() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        assert!(matches!(manager.select("Nope"), Err(ProfileError::NotFound(_))));
        assert_eq!(manager.selected(), "Default");
    }

    #[test]
    fn test_delete_selected_falls_back_to_marked_default() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.mark_default("Bench", SerialProfile::default()).unwrap();
        manager.save_profile("Lab", lab()).unwrap();

        assert_eq!(manager.delete("Lab").unwrap(), "Bench");
        assert_eq!(manager.selected(), "Bench");
    }

    #[test]
    fn test_delete_default_is_refused() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_profile("Lab", lab()).unwrap();
        let before = manager.snapshot();
        assert!(matches!(manager.delete("Default"), Err(ProfileError::Protected)));
        assert_eq!(manager.snapshot(), before);
        assert_eq!(manager.selected(), "Lab");
    }

    #[test]
    fn test_reload_keeps_selection_when_present() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_profile("Lab", lab()).unwrap();

        let mut external = manager.store().read().unwrap();
        external.upsert("Other", SerialProfile::default()).unwrap();
        manager.store().save(&external).unwrap();

        assert_eq!(
            manager.reload_from_disk(),
            ReloadOutcome::Reloaded {
                selected: "Lab".to_string(),
                selection_changed: false,
                dropped: vec![],
            }
        );
        assert!(manager.names().contains(&"Other".to_string()));
    }

    #[test]
    fn test_reload_after_external_removal() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_profile("Lab", lab()).unwrap();

        let mut external = manager.store().read().unwrap();
        external.remove("Lab").unwrap();
        manager.store().save(&external).unwrap();

        match manager.reload_from_disk() {
            ReloadOutcome::Reloaded {
                selected,
                selection_changed,
                ..
            } => {
                assert_eq!(selected, "Default");
                assert!(selection_changed);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_reload_missing_and_corrupt_keep_memory() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.save_profile("Lab", lab()).unwrap();

        std::fs::write(manager.store().path(), "garbage").unwrap();
        assert!(matches!(manager.reload_from_disk(), ReloadOutcome::Failed(_)));
        assert!(manager.get("Lab").is_some());

        std::fs::remove_file(manager.store().path()).unwrap();
        assert_eq!(manager.reload_from_disk(), ReloadOutcome::Missing);
        assert!(manager.get("Lab").is_some());
    }

    #[test]
    fn test_reload_skipped_while_deleting() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.deleting.store(true, Ordering::SeqCst);
        assert_eq!(manager.reload_from_disk(), ReloadOutcome::Skipped);
    }

    #[test]
    fn test_invalid_save_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let bad = SerialProfile {
            data_bits: 3,
            ..lab()
        };
        assert!(matches!(
            manager.save_profile("Bad", bad),
            Err(ProfileError::Invalid { .. })
        ));
        assert!(manager.get("Bad").is_none());
        assert!(!manager.store().exists());
    }
}
