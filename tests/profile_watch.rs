//! External edits to the profile file reach a running manager.

mod common;

use common::{profile, temp_store, wait_until};
use serialdesk::profile::{ProfileManager, ProfileSet, ProfileWatcher, ReloadOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(150);

#[test]
fn test_external_save_is_picked_up() {
    let (_dir, store) = temp_store();
    let manager = Arc::new(ProfileManager::open(store.clone()));
    manager.persist().unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let _watcher = ProfileWatcher::start(store.path(), DEBOUNCE, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    // Let the platform watcher settle before writing.
    std::thread::sleep(Duration::from_millis(100));

    // A second instance writes through its own store handle.
    let mut external = ProfileSet::default();
    external.upsert("Bench", profile("COM9", 230400)).unwrap();
    store.save(&external).unwrap();

    assert!(wait_until(Duration::from_secs(5), || fired.load(Ordering::SeqCst) > 0));
    // One burst, one callback.
    std::thread::sleep(DEBOUNCE * 3);
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    match manager.reload_from_disk() {
        ReloadOutcome::Reloaded {
            selection_changed, ..
        } => assert!(!selection_changed),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(manager.get("Bench").unwrap().baud_rate, 230400);
}

#[test]
fn test_selection_falls_back_when_removed_externally() {
    let (_dir, store) = temp_store();
    let manager = ProfileManager::open(store.clone());
    manager.save_profile("Scope", profile("COM4", 19200)).unwrap();
    assert_eq!(manager.selected(), "Scope");

    store.save(&ProfileSet::default()).unwrap();

    assert_eq!(
        manager.reload_from_disk(),
        ReloadOutcome::Reloaded {
            selected: "Default".to_string(),
            selection_changed: true,
            dropped: Vec::new(),
        }
    );
    assert_eq!(manager.selected(), "Default");
}

#[test]
fn test_missing_file_keeps_memory() {
    let (_dir, store) = temp_store();
    let manager = ProfileManager::open(store.clone());
    manager.save_profile("Scope", profile("COM4", 19200)).unwrap();
    std::fs::remove_file(store.path()).unwrap();

    assert_eq!(manager.reload_from_disk(), ReloadOutcome::Missing);
    assert!(manager.get("Scope").is_some());
}

#[test]
fn test_corrupt_file_keeps_memory() {
    let (_dir, store) = temp_store();
    let manager = ProfileManager::open(store.clone());
    manager.save_profile("Scope", profile("COM4", 19200)).unwrap();
    std::fs::write(store.path(), "{ truncated").unwrap();

    assert!(matches!(
        manager.reload_from_disk(),
        ReloadOutcome::Failed(_)
    ));
    assert_eq!(manager.selected(), "Scope");
}
