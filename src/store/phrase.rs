//! Ordered, deduplicated phrase store.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use super::persist::{Persister, Snapshot};
use super::{KeySetStore, MemoryKeySetStore};
use crate::error::Result;
use crate::text::{collapse_whitespace, truncate_chars};

/// Stored phrases are cut to this many characters.
pub const PHRASE_MAX_CHARS: usize = 60;

#[derive(Debug, Default)]
struct Inner {
    order: VecDeque<String>,
    keys: HashSet<String>,
}

impl Inner {
    fn insert(&mut self, phrase: String) -> bool {
        if !self.keys.insert(phrase.to_lowercase()) {
            return false;
        }
        self.order.push_back(phrase);
        true
    }
}

struct Entries {
    inner: Mutex<Inner>,
}

impl Entries {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Snapshot for Entries {
    fn snapshot(&self) -> Vec<String> {
        self.lock().order.iter().cloned().collect()
    }
}

/// Insertion-ordered phrase set, unique by lowercase text.
///
/// Clones share the same contents.
#[derive(Clone)]
pub struct PhraseStore {
    entries: Arc<Entries>,
    persister: Arc<Persister>,
}

impl std::fmt::Debug for PhraseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhraseStore").field("len", &self.len()).finish()
    }
}

fn sanitize(phrase: &str) -> String {
    truncate_chars(&collapse_whitespace(phrase), PHRASE_MAX_CHARS)
}

impl PhraseStore {
    /// Open a store over `backend`, loading its current contents.
    ///
    /// A failed load is logged and leaves the store empty.
    pub fn open(name: &'static str, backend: Arc<dyn KeySetStore>) -> Self {
        let mut inner = Inner::default();
        match backend.load() {
            Ok(loaded) => {
                for phrase in loaded {
                    let cleaned = sanitize(&phrase);
                    if !cleaned.is_empty() {
                        inner.insert(cleaned);
                    }
                }
            },
            Err(e) => warn!(store = name, error = %e, "Failed to load phrase store"),
        }
        Self {
            entries: Arc::new(Entries {
                inner: Mutex::new(inner),
            }),
            persister: Arc::new(Persister::new(name, backend)),
        }
    }

    /// Store backed by a fresh [`MemoryKeySetStore`]
    pub fn in_memory(name: &'static str) -> Self {
        Self::open(name, Arc::new(MemoryKeySetStore::new()))
    }

    /// Insert `phrase`; false when empty after cleanup or already present.
    pub fn add(&self, phrase: &str) -> bool {
        let cleaned = sanitize(phrase);
        if cleaned.is_empty() {
            return false;
        }
        let inserted = self.entries.lock().insert(cleaned);
        if inserted {
            Persister::request(&self.entries, &self.persister);
        }
        inserted
    }

    /// Insert several phrases; returns how many were new.
    pub fn extend<'a, I>(&self, phrases: I) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut added = 0;
        {
            let mut inner = self.entries.lock();
            for phrase in phrases {
                let cleaned = sanitize(phrase);
                if !cleaned.is_empty() && inner.insert(cleaned) {
                    added += 1;
                }
            }
        }
        if added > 0 {
            Persister::request(&self.entries, &self.persister);
        }
        added
    }

    /// All phrases, oldest first
    pub fn all(&self) -> Vec<String> {
        self.entries.snapshot()
    }

    /// Number of phrases
    pub fn len(&self) -> usize {
        self.entries.lock().order.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `phrase` is stored (case-insensitive)
    pub fn contains(&self, phrase: &str) -> bool {
        self.entries.lock().keys.contains(&sanitize(phrase).to_lowercase())
    }

    /// Evict oldest phrases until at most `max` remain; returns how many went.
    pub fn trim_to_max(&self, max: usize) -> usize {
        let removed = {
            let mut inner = self.entries.lock();
            let mut removed = 0;
            while inner.order.len() > max {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.keys.remove(&oldest.to_lowercase());
                    removed += 1;
                }
            }
            removed
        };
        if removed > 0 {
            Persister::request(&self.entries, &self.persister);
        }
        removed
    }

    /// Write the current contents synchronously.
    pub fn persist_now(&self) -> Result<()> {
        self.persister.backend().persist(&self.all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_dedups_by_lowercase() {
        let store = PhraseStore::in_memory("test");
        assert!(store.add("Meet at spawn"));
        assert!(!store.add("meet   at SPAWN"));
        assert!(!store.add("   "));
        assert!(store.contains("MEET AT SPAWN"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_trim_evicts_oldest() {
        let store = PhraseStore::in_memory("test");
        for phrase in ["one", "two", "three", "four"] {
            store.add(phrase);
        }
        assert_eq!(store.trim_to_max(2), 2);
        assert_eq!(store.all(), vec!["three".to_string(), "four".to_string()]);
        // Evicted phrases may come back
        assert!(store.add("one"));
    }

    #[test]
    fn test_long_phrases_truncated() {
        let store = PhraseStore::in_memory("test");
        store.add(&"x".repeat(100));
        assert_eq!(store.all()[0].chars().count(), PHRASE_MAX_CHARS);
    }

    #[test]
    fn test_persists_without_runtime() {
        let backend = Arc::new(MemoryKeySetStore::with_entries(["loaded line"]));
        let store = PhraseStore::open("test", backend.clone());
        assert_eq!(store.len(), 1);

        store.add("new line");
        assert_eq!(
            backend.entries(),
            vec!["loaded line".to_string(), "new line".to_string()]
        );
    }

    #[tokio::test]
    async fn test_coalesced_writes_converge() {
        let backend = Arc::new(MemoryKeySetStore::new());
        let store = PhraseStore::open("test", backend.clone());
        for i in 0..50 {
            store.add(&format!("phrase number {i}"));
        }
        for _ in 0..100 {
            if backend.entries().len() == 50 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(backend.entries().len(), 50);
        assert!(backend.writes() <= 50);
    }
}
