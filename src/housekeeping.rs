//! Spool maintenance: archived feed copies are useful for a few weeks of
//! debugging and worthless after that.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::util::env::env_parse;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub removed: u64,
    pub kept: u64,
    pub errors: u64,
}

impl fmt::Display for CleanupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "removed={} kept={} errors={}",
            self.removed, self.kept, self.errors
        )
    }
}

pub fn retention_from_env() -> Duration {
    Duration::from_secs(env_parse::<u64>("CLEANUP_RETENTION_DAYS", 14) * 86_400)
}

/// Deletes archived feed files older than the retention window. The spool
/// has one directory per supplier; anything else at the top level is left
/// alone. A missing spool directory just means there is nothing to clean.
pub fn cleanup_spool(dir: &Path, retention: Duration) -> Result<CleanupStats> {
    let mut stats = CleanupStats::default();
    if !dir.exists() {
        info!(dir = %dir.display(), "spool directory absent, nothing to clean");
        return Ok(stats);
    }
    let cutoff = SystemTime::now().checked_sub(retention);

    let entries =
        fs::read_dir(dir).with_context(|| format!("reading spool dir {}", dir.display()))?;
    for entry in entries {
        let entry = entry.context("reading spool dir entry")?;
        let supplier_dir = entry.path();
        if !supplier_dir.is_dir() {
            continue;
        }
        let files = fs::read_dir(&supplier_dir)
            .with_context(|| format!("reading {}", supplier_dir.display()))?;
        for file in files {
            let file = file.context("reading archive entry")?;
            let path = file.path();
            let modified = match file.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(error) => {
                    warn!(file = %path.display(), %error, "cannot stat archive");
                    stats.errors += 1;
                    continue;
                }
            };
            let expired = matches!(cutoff, Some(cutoff) if modified <= cutoff);
            if !expired {
                stats.kept += 1;
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => stats.removed += 1,
                Err(error) => {
                    warn!(file = %path.display(), %error, "cannot remove archive");
                    stats.errors += 1;
                }
            }
        }
    }

    info!(dir = %dir.display(), %stats, "spool cleanup finished");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_archive(root: &Path, supplier: &str, name: &str) {
        let dir = root.join(supplier);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), b"sku;qty;price\n").unwrap();
    }

    #[test]
    fn zero_retention_removes_everything() {
        let spool = tempfile::tempdir().unwrap();
        seed_archive(spool.path(), "deltyre", "20250101T000000000.csv");
        seed_archive(spool.path(), "rimexpo", "20250102T000000000.csv");

        let stats = cleanup_spool(spool.path(), Duration::ZERO).unwrap();
        assert_eq!(stats.removed, 2);
        assert_eq!(stats.kept, 0);
        assert_eq!(stats.errors, 0);
        assert!(fs::read_dir(spool.path().join("deltyre"))
            .unwrap()
            .next()
            .is_none());
    }

    #[test]
    fn fresh_archives_survive_a_long_retention() {
        let spool = tempfile::tempdir().unwrap();
        seed_archive(spool.path(), "deltyre", "20250101T000000000.csv");

        let stats = cleanup_spool(spool.path(), Duration::from_secs(3600)).unwrap();
        assert_eq!(stats.removed, 0);
        assert_eq!(stats.kept, 1);
    }

    #[test]
    fn missing_spool_is_not_an_error() {
        let spool = tempfile::tempdir().unwrap();
        let missing = spool.path().join("nope");

        let stats = cleanup_spool(&missing, Duration::ZERO).unwrap();
        assert_eq!(stats, CleanupStats::default());
    }

    #[test]
    fn stray_top_level_files_are_left_alone() {
        let spool = tempfile::tempdir().unwrap();
        fs::write(spool.path().join("notes.txt"), b"keep me").unwrap();
        seed_archive(spool.path(), "deltyre", "20250101T000000000.csv");

        let stats = cleanup_spool(spool.path(), Duration::ZERO).unwrap();
        assert_eq!(stats.removed, 1);
        assert!(spool.path().join("notes.txt").exists());
    }
}
