//! Phrase and raw-text stores.
//!
//! Both stores keep their ordered contents in memory and hand a full
//! snapshot to a [`KeySetStore`] after each mutation. Writes are coalesced:
//! while one write runs, further mutations only mark the store dirty and the
//! running writer loops until nothing is left to write.

mod persist;
mod phrase;
mod raw;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub use phrase::{PhraseStore, PHRASE_MAX_CHARS};
pub use raw::{RawArchive, RAW_MAX_CHARS, RAW_MIN_CAPACITY};

use crate::error::{PulseError, Result};

/// Ordered key-set persistence.
pub trait KeySetStore: Send + Sync {
    /// Load the stored entries in order.
    fn load(&self) -> Result<Vec<String>>;

    /// Replace the stored entries.
    fn persist(&self, entries: &[String]) -> Result<()>;
}

/// In-memory key set, counting writes.
#[derive(Debug, Default)]
pub struct MemoryKeySetStore {
    entries: Mutex<Vec<String>>,
    writes: AtomicUsize,
}

impl MemoryKeySetStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `entries`
    pub fn with_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: Mutex::new(entries.into_iter().map(Into::into).collect()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Current contents
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of completed writes
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }
}

impl KeySetStore for MemoryKeySetStore {
    fn load(&self) -> Result<Vec<String>> {
        Ok(self.entries())
    }

    fn persist(&self, entries: &[String]) -> Result<()> {
        *self.entries.lock().unwrap_or_else(PoisonError::into_inner) = entries.to_vec();
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Key set stored as a JSON array in one file.
///
/// Writes go to a sibling temp file that is then renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    // one writer at a time; the temp file is shared
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeySetStore for JsonFileStore {
    fn load(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn persist(&self, entries: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_vec_pretty(entries)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            PulseError::Store(format!("Failed to replace {}: {e}", self.path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("phrases.json"));
        assert!(store.load().unwrap().is_empty());

        let entries = vec!["meet at spawn".to_string(), "刷怪塔修好了".to_string()];
        store.persist(&entries).unwrap();
        assert_eq!(store.load().unwrap(), entries);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, PulseError::Json(_)));
    }

    #[test]
    fn test_memory_store_counts_writes() {
        let store = MemoryKeySetStore::with_entries(["a"]);
        assert_eq!(store.load().unwrap(), vec!["a".to_string()]);
        store.persist(&["b".to_string()]).unwrap();
        assert_eq!(store.entries(), vec!["b".to_string()]);
        assert_eq!(store.writes(), 1);
    }
}
