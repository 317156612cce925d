//! Coverage cache backends
//!
//! Discovery reads through a [`CoverageStore`] before probing and flushes it
//! after every fresh result, so an interrupted run loses at most the probe in
//! flight.

use fd_lock::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::coverage::CoverageResult;
use crate::identifier::CoverageKey;

/// Coverage cache errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}

/// Key-value store for probe results
pub trait CoverageStore {
    /// Cached result for `key`
    fn get(&self, key: &CoverageKey) -> Option<CoverageResult>;

    /// Record a result; not durable until [`CoverageStore::flush`]
    fn set(&mut self, key: CoverageKey, result: CoverageResult);

    /// Persist pending entries
    fn flush(&mut self) -> Result<(), StoreError>;

    /// Number of cached entries
    fn len(&self) -> usize;

    /// `true` when nothing is cached
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process store, nothing survives the run
#[derive(Debug, Default)]
pub struct MemoryCoverageStore {
    entries: BTreeMap<String, CoverageResult>,
    flushes: usize,
}

impl MemoryCoverageStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times [`CoverageStore::flush`] ran
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl CoverageStore for MemoryCoverageStore {
    fn get(&self, key: &CoverageKey) -> Option<CoverageResult> {
        self.entries.get(&key.to_string()).cloned()
    }

    fn set(&mut self, key: CoverageKey, result: CoverageResult) {
        self.entries.insert(key.to_string(), result);
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.flushes += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// JSON file mapping `entity_type|entity_code|metric` to a result
///
/// Writes go through a temp file in the same directory that is renamed over
/// the cache, under an advisory lock on `<path>.lock`.
#[derive(Debug)]
pub struct JsonFileCoverageStore {
    path: PathBuf,
    entries: BTreeMap<String, CoverageResult>,
    dirty: bool,
}

impl JsonFileCoverageStore {
    /// Open the cache at `path`; a missing file is an empty cache
    ///
    /// Entries that do not decode are dropped with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut entries = BTreeMap::new();

        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::IoError(format!("Failed to read cache: {e}")))?;
            let root: Value = if contents.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&contents)
                    .map_err(|e| StoreError::DeserializationError(e.to_string()))?
            };
            match root {
                Value::Object(map) => {
                    for (key, value) in map {
                        match serde_json::from_value::<CoverageResult>(value) {
                            Ok(result) => {
                                entries.insert(key, result);
                            }
                            Err(e) => warn!(key = %key, error = %e, "Skipping unreadable coverage entry"),
                        }
                    }
                }
                _ => warn!(path = %path.display(), "Coverage cache is not a JSON object, starting empty"),
            }
        }

        info!(path = %path.display(), entries = entries.len(), "Opened coverage cache");
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::IoError(e.to_string()))?;
            }
        }

        let mut json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        json.push('\n');

        let lock_path = self.path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StoreError::LockError(format!("Failed to create lock file: {e}")))?;

        debug!("Acquiring write lock for coverage cache");
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| StoreError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| StoreError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| StoreError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| StoreError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| StoreError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| StoreError::IoError(format!("Failed to persist temp file: {e}")))?;

        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        debug!(path = %self.path.display(), entries = self.entries.len(), "Coverage cache saved");
        Ok(())
    }
}

impl CoverageStore for JsonFileCoverageStore {
    fn get(&self, key: &CoverageKey) -> Option<CoverageResult> {
        self.entries.get(&key.to_string()).cloned()
    }

    fn set(&mut self, key: CoverageKey, result: CoverageResult) {
        self.entries.insert(key.to_string(), result);
        self.dirty = true;
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty && self.path.exists() {
            return Ok(());
        }
        self.save()?;
        self.dirty = false;
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageStatus, ProbeMethod};
    use crate::EntityType;
    use tempfile::TempDir;

    fn result(earliest: i64, latest: i64) -> CoverageResult {
        CoverageResult {
            earliest_ts: Some(earliest),
            latest_ts: Some(latest),
            status: CoverageStatus::Ok,
            method: ProbeMethod::YearMonthDay,
            checked_at_utc: "2026-10-19T00:00:00Z".to_string(),
        }
    }

    fn key(code: &str) -> CoverageKey {
        CoverageKey::new(EntityType::Country, code, "ping-slash24")
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intermediate").join("coverage_cache.json");

        let mut store = JsonFileCoverageStore::open(&path).unwrap();
        assert!(store.is_empty());
        store.set(key("NG"), result(100, 200));
        store.flush().unwrap();

        let reopened = JsonFileCoverageStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(&key("NG")), Some(result(100, 200)));
        assert_eq!(reopened.get(&key("GH")), None);

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &raw["country|NG|ping-slash24"];
        assert_eq!(entry["status"], "ok");
        assert_eq!(entry["method"], "probe_year_month_day");
        assert_eq!(entry["earliest_ts"], 100);
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            r#"{
                "country|NG|bgp": {"earliest_ts": null, "latest_ts": null, "status": "no_recent_data",
                                   "method": "probe_recent_empty", "checked_at_utc": "2026-01-01T00:00:00Z"},
                "country|GH|bgp": "garbage"
            }"#,
        )
        .unwrap();
        let store = JsonFileCoverageStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        let hit = store
            .get(&CoverageKey::new(EntityType::Country, "NG", "bgp"))
            .unwrap();
        assert_eq!(hit.status, CoverageStatus::NoRecentData);
    }

    #[test]
    fn test_memory_store_counts_flushes() {
        let mut store = MemoryCoverageStore::new();
        store.set(key("NG"), result(1, 2));
        store.flush().unwrap();
        store.flush().unwrap();
        assert_eq!(store.flush_count(), 2);
        assert_eq!(store.len(), 1);
    }
}
