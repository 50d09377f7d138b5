//! Age-based evidence cleanup.

use anyhow::Result;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::evidence::EvidenceDirs;

/// Delete evidence files older than `max_age` across the three evidence
/// directories. Returns how many files were removed. Directories that do not
/// exist yet are treated as empty; per-file failures are logged and skipped
/// so one stubborn file never aborts the sweep.
pub fn sweep(dirs: &EvidenceDirs, max_age: Duration) -> Result<usize> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut removed = 0;
    for dir in [&dirs.photos, &dirs.clips, &dirs.logs] {
        removed += sweep_dir(dir, cutoff)?;
    }
    if removed > 0 {
        log::info!("retention sweep removed {} evidence files", removed);
    }
    Ok(removed)
}

fn sweep_dir(dir: &Path, cutoff: SystemTime) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                log::warn!("retention: cannot stat {}: {}", path.display(), err);
                continue;
            }
        };
        if modified >= cutoff {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) => log::warn!("retention: cannot remove {}: {}", path.display(), err),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn old_files_are_removed_fresh_files_kept() {
        let root = tempfile::tempdir().unwrap();
        let dirs = EvidenceDirs::under(root.path());
        fs::create_dir_all(&dirs.photos).unwrap();
        fs::create_dir_all(&dirs.clips).unwrap();

        let old = dirs.photos.join("detection_20200101_000000_90.jpg");
        let fresh = dirs.clips.join("detection_now.mjpeg");
        fs::write(&old, b"old").unwrap();
        fs::write(&fresh, b"fresh").unwrap();

        // Backdate the old file well past any cutoff we use below.
        let past = SystemTime::now() - Duration::from_secs(60 * 60 * 24 * 30);
        let file = fs::File::options().append(true).open(&old).unwrap();
        file.set_modified(past).unwrap();
        drop(file);

        let removed = sweep(&dirs, Duration::from_secs(60 * 60 * 24 * 7)).unwrap();
        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn missing_directories_count_as_empty() {
        let root = tempfile::tempdir().unwrap();
        let dirs = EvidenceDirs::under(root.path());
        assert_eq!(sweep(&dirs, Duration::from_secs(1)).unwrap(), 0);
    }
}
