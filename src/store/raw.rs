//! Bounded archive of raw observed lines, kept for diagnostics.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use super::persist::{Persister, Snapshot};
use super::{KeySetStore, MemoryKeySetStore};
use crate::text::{collapse_whitespace, truncate_chars};

/// Raw lines are cut to this many characters.
pub const RAW_MAX_CHARS: usize = 160;
/// The archive never shrinks below this capacity.
pub const RAW_MIN_CAPACITY: usize = 100;

struct Lines {
    lines: Mutex<VecDeque<String>>,
}

impl Lines {
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Snapshot for Lines {
    fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }
}

/// Most-recent-last set of raw lines with a capacity.
#[derive(Clone)]
pub struct RawArchive {
    lines: Arc<Lines>,
    persister: Arc<Persister>,
    capacity: usize,
}

impl std::fmt::Debug for RawArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawArchive")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl RawArchive {
    /// Open an archive over `backend` holding at most `capacity` lines.
    pub fn open(backend: Arc<dyn KeySetStore>, capacity: usize) -> Self {
        let capacity = capacity.max(RAW_MIN_CAPACITY);
        let mut lines = VecDeque::new();
        match backend.load() {
            Ok(loaded) => {
                for line in loaded {
                    let cleaned = truncate_chars(&collapse_whitespace(&line), RAW_MAX_CHARS);
                    if !cleaned.is_empty() && !lines.contains(&cleaned) {
                        lines.push_back(cleaned);
                    }
                }
                while lines.len() > capacity {
                    lines.pop_front();
                }
            },
            Err(e) => warn!(store = "raw", error = %e, "Failed to load raw archive"),
        }
        Self {
            lines: Arc::new(Lines {
                lines: Mutex::new(lines),
            }),
            persister: Arc::new(Persister::new("raw", backend)),
            capacity,
        }
    }

    /// Archive backed by a fresh [`MemoryKeySetStore`]
    pub fn in_memory(capacity: usize) -> Self {
        Self::open(Arc::new(MemoryKeySetStore::new()), capacity)
    }

    /// Append `text`; an existing equal line moves to the back.
    pub fn add(&self, text: &str) {
        let cleaned = truncate_chars(&collapse_whitespace(text), RAW_MAX_CHARS);
        if cleaned.is_empty() {
            return;
        }
        {
            let mut lines = self.lines.lock();
            if let Some(pos) = lines.iter().position(|line| *line == cleaned) {
                lines.remove(pos);
            }
            lines.push_back(cleaned);
            while lines.len() > self.capacity {
                lines.pop_front();
            }
        }
        Persister::request(&self.lines, &self.persister);
    }

    /// Number of archived lines
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Archived lines, oldest first
    pub fn all(&self) -> Vec<String> {
        self.lines.snapshot()
    }
}
