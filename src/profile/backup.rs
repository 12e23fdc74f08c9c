//! Timestamped copies of the profile file taken before each overwrite.

use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory name, relative to the profile file, that holds backups.
pub const BACKUP_DIR_NAME: &str = "Backups";

/// Copy `live` into `backup_dir` as `<stem>_<YYYYMMDD_HHMMSS_mmm>.<ext>`.
///
/// Two backups within the same millisecond get a zero-padded `_NNN` suffix.
pub fn create_backup(live: &Path, backup_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(backup_dir)?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
    let candidate = free_backup_path(live, backup_dir, &stamp);

    fs::copy(live, &candidate)?;
    debug!(backup = %candidate.display(), "profile backup written");
    Ok(candidate)
}

/// First unused backup name for `stamp`. The padded counter keeps name
/// order equal to creation order, and `.` sorts before `_`.
fn free_backup_path(live: &Path, backup_dir: &Path, stamp: &str) -> PathBuf {
    let (stem, ext) = name_parts(live);
    let mut candidate = backup_dir.join(format!("{stem}_{stamp}.{ext}"));
    let mut counter = 1;
    while candidate.exists() {
        candidate = backup_dir.join(format!("{stem}_{stamp}_{counter:03}.{ext}"));
        counter += 1;
    }
    candidate
}

/// Backups of `live` in `backup_dir`, oldest first.
pub fn list_backups(live: &Path, backup_dir: &Path) -> Vec<PathBuf> {
    let (stem, ext) = name_parts(live);
    let prefix = format!("{stem}_");
    let suffix = format!(".{ext}");

    let Ok(entries) = fs::read_dir(backup_dir) else {
        return Vec::new();
    };
    let mut backups: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(&suffix))
        })
        .collect();
    // Timestamps are fixed width, so name order is age order.
    backups.sort();
    backups
}

/// Delete the oldest backups so at most `keep` remain. Returns how many were deleted.
pub fn prune_backups(live: &Path, backup_dir: &Path, keep: usize) -> usize {
    let backups = list_backups(live, backup_dir);
    if backups.len() <= keep {
        return 0;
    }
    let excess = backups.len() - keep;
    let mut removed = 0;
    for path in backups.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(backup = %path.display(), error = %e, "failed to delete old backup"),
        }
    }
    removed
}

fn name_parts(live: &Path) -> (String, String) {
    let stem = live
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("profiles")
        .to_string();
    let ext = live
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("json")
        .to_string();
    (stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_name_format() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("SerialPortConfig.json");
        fs::write(&live, "{}").unwrap();

        let backup = create_backup(&live, &dir.path().join(BACKUP_DIR_NAME)).unwrap();
        let name = backup.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("SerialPortConfig_"));
        assert!(name.ends_with(".json"));
        // SerialPortConfig_YYYYMMDD_HHMMSS_mmm.json
        assert_eq!(name.len(), "SerialPortConfig_".len() + 19 + ".json".len());
        assert_eq!(fs::read_to_string(backup).unwrap(), "{}");
    }

    #[test]
    fn test_same_instant_backups_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("profiles.json");
        fs::write(&live, "1").unwrap();
        let backups = dir.path().join(BACKUP_DIR_NAME);

        let created: Vec<PathBuf> = (0..5)
            .map(|_| create_backup(&live, &backups).unwrap())
            .collect();
        let mut unique = created.clone();
        unique.dedup();
        assert_eq!(unique.len(), 5);
        assert_eq!(list_backups(&live, &backups).len(), 5);
    }

    #[test]
    fn test_collisions_list_in_creation_order() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("profiles.json");
        let backups = dir.path().join(BACKUP_DIR_NAME);
        fs::create_dir_all(&backups).unwrap();

        let stamp = "20260101_120000_500";
        let mut created = Vec::new();
        for i in 0..12 {
            let path = free_backup_path(&live, &backups, stamp);
            fs::write(&path, i.to_string()).unwrap();
            created.push(path);
        }
        // Next millisecond.
        let later = free_backup_path(&live, &backups, "20260101_120000_501");
        fs::write(&later, "later").unwrap();
        created.push(later);

        assert!(created[10].ends_with("profiles_20260101_120000_500_010.json"));
        assert_eq!(list_backups(&live, &backups), created);

        assert_eq!(prune_backups(&live, &backups, 3), 10);
        let contents: Vec<String> = list_backups(&live, &backups)
            .iter()
            .map(|p| fs::read_to_string(p).unwrap())
            .collect();
        assert_eq!(contents, vec!["10", "11", "later"]);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("profiles.json");
        let backups = dir.path().join(BACKUP_DIR_NAME);
        fs::create_dir_all(&backups).unwrap();
        for i in 0..12 {
            fs::write(
                backups.join(format!("profiles_20260101_0000{i:02}_000.json")),
                i.to_string(),
            )
            .unwrap();
        }
        fs::write(backups.join("unrelated.txt"), "x").unwrap();

        assert_eq!(prune_backups(&live, &backups, 10), 2);
        let left = list_backups(&live, &backups);
        assert_eq!(left.len(), 10);
        assert!(left[0].ends_with("profiles_20260101_000002_000.json"));
        assert!(backups.join("unrelated.txt").exists());
    }

    #[test]
    fn test_missing_backup_dir_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("profiles.json");
        assert!(list_backups(&live, &dir.path().join("nope")).is_empty());
        assert_eq!(prune_backups(&live, &dir.path().join("nope"), 1), 0);
    }
}
