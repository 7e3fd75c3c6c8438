use crate::error::{MetricsError, Result};
use crate::models::MetricsSnapshot;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const SNAPSHOT_FILE: &str = "metrics_snapshot.json";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// The single JSON snapshot file kept in a metrics directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Replace the snapshot file. Each save writes its own sibling temp file
    /// and renames it over the old one, so readers see either the old or the
    /// new file and concurrent saves never share a temp file.
    pub fn save(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| MetricsError::io(&self.dir, e))?;
        let json = serde_json::to_string_pretty(snapshot)?;
        let target = self.path();
        let tmp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            SNAPSHOT_FILE,
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, json).map_err(|e| MetricsError::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(MetricsError::io(&target, e));
        }
        log::info!(
            "Saved metrics snapshot: {} repos -> {}",
            snapshot.repo_count,
            target.display()
        );
        Ok(())
    }

    /// The last saved snapshot; `None` when absent or unreadable.
    pub fn load(&self) -> Option<MetricsSnapshot> {
        load_from(&self.path())
    }
}

fn load_from(path: &Path) -> Option<MetricsSnapshot> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            log::warn!("Ignoring malformed snapshot {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepoSnapshot;

    #[test]
    fn missing_file_loads_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("metrics"));
        assert!(store.load().is_none());
    }

    #[test]
    fn malformed_file_loads_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        fs::write(store.path(), "{\"generated_at\": 3").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn save_overwrites_wholesale() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("metrics"));

        let first = MetricsSnapshot::new(vec![
            RepoSnapshot::empty(Path::new("/r/a")),
            RepoSnapshot::empty(Path::new("/r/b")),
        ]);
        store.save(&first).unwrap();
        assert_eq!(store.load().unwrap().repo_count, 2);

        let second = MetricsSnapshot::new(vec![RepoSnapshot::empty(Path::new("/r/c"))]);
        store.save(&second).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, second);
        assert!(loaded.find("a").is_none());

        let leftovers: Vec<_> = fs::read_dir(tmp.path().join("metrics"))
            .unwrap()
            .flatten()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn concurrent_saves_all_succeed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("metrics"));
        let repos: Vec<RepoSnapshot> = (0..500)
            .map(|i| RepoSnapshot::empty(Path::new(&format!("/r/repo{}", i))))
            .collect();
        let snapshot = MetricsSnapshot::new(repos);

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        (0..20)
                            .filter(|_| store.save(&snapshot).is_err())
                            .count()
                    })
                })
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), 0);
            }
        });

        assert_eq!(store.load().unwrap().repo_count, 500);
        let leftovers: Vec<_> = fs::read_dir(tmp.path().join("metrics"))
            .unwrap()
            .flatten()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn file_layout_matches_contract() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        store
            .save(&MetricsSnapshot::new(vec![RepoSnapshot::empty(Path::new("/r/a"))]))
            .unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(raw["generated_at"].is_string());
        assert_eq!(raw["repo_count"], 1);
        assert_eq!(raw["repos"][0]["name"], "a");
        assert!(raw["repos"][0]["git"].is_object());
    }
}
