//! ==============================================================================
//! persist.rs - registry snapshot storage
//! ==============================================================================
//!
//! purpose:
//!     loads the bin map once at startup and overwrites it after every
//!     accepted mutation. durability is best effort: a bad or missing file
//!     starts the hub empty, and a failed write never undoes in-memory state.
//!
//!   save() is plain blocking std::fs and runs under the hub lock, so a slow
//!   disk delays the next request; mutations stay strictly ordered.
//!
//! implementations:
//!     - JsonFileStore: one pretty-printed json object, deviceId -> Bin
//!     - MemoryStore: keeps the last snapshot in memory (tests, --in-memory)
//!
//! ==============================================================================

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::domain::BinMap;
use crate::error::HubResult;

pub trait SnapshotStore: Send + Sync {
    /// read the stored registry; never fails, falls back to empty
    fn load(&self) -> BinMap;
    /// overwrite the stored registry with `snapshot`
    fn save(&self, snapshot: &BinMap) -> HubResult<()>;
}

// ==============================================================================
// json file
// ==============================================================================

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "bins.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> BinMap {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No bin data at {}, starting empty", self.path.display());
                return BinMap::new();
            }
            Err(e) => {
                tracing::error!("Failed to read {}: {}", self.path.display(), e);
                return BinMap::new();
            }
        };

        match serde_json::from_str::<BinMap>(&content) {
            Ok(bins) => {
                tracing::info!("Loaded {} bins from {}", bins.len(), self.path.display());
                bins
            }
            Err(e) => {
                tracing::error!("Ignoring malformed bin data in {}: {}", self.path.display(), e);
                BinMap::new()
            }
        }
    }

    fn save(&self, snapshot: &BinMap) -> HubResult<()> {
        let json = serde_json::to_string_pretty(snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // readers never see a half-written file
        let tmp = self.temp_path();
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("Bin data written to {}", self.path.display());
        Ok(())
    }
}

// ==============================================================================
// in memory
// ==============================================================================

#[derive(Default)]
pub struct MemoryStore {
    last: Mutex<BinMap>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// a store whose load() returns `bins`
    pub fn with_snapshot(bins: BinMap) -> Self {
        Self {
            last: Mutex::new(bins),
            saves: AtomicUsize::new(0),
        }
    }

    /// number of save() calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn last_saved(&self) -> BinMap {
        self.last.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> BinMap {
        self.last_saved()
    }

    fn save(&self, snapshot: &BinMap) -> HubResult<()> {
        let mut guard = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bin;

    fn sample() -> BinMap {
        let mut bins = BinMap::new();
        let mut bin = Bin::new("A", Some(100));
        bin.bolt_count = 40;
        bin.part_number = Some("P1".into());
        bins.insert("A".into(), bin);
        bins
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("bolt_data.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn malformed_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bolt_data.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileStore::new(&path).load().is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("bolt_data.json"));
        store.save(&sample()).unwrap();

        let loaded = store.load();
        assert_eq!(loaded, sample());
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn save_overwrites_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("bolt_data.json"));
        store.save(&sample()).unwrap();
        store.save(&BinMap::new()).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn file_layout_is_keyed_by_device() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("bolt_data.json"));
        store.save(&sample()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["A"]["deviceId"], "A");
        assert_eq!(raw["A"]["boltCount"], 40);
        assert_eq!(raw["A"]["totalCapacity"], 100);
    }

    #[test]
    fn save_into_missing_directory_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let store = JsonFileStore::new(blocker.join("bolt_data.json"));
        assert!(store.save(&sample()).is_err());
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryStore::new();
        store.save(&sample()).unwrap();
        store.save(&sample()).unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.load(), sample());
    }
}
