//! Coalesced background persistence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use super::KeySetStore;

/// Source of the snapshot to write.
pub(crate) trait Snapshot: Send + Sync + 'static {
    fn snapshot(&self) -> Vec<String>;
}

/// Dirty-flag drain loop around a [`KeySetStore`].
pub(crate) struct Persister {
    name: &'static str,
    backend: Arc<dyn KeySetStore>,
    dirty: AtomicBool,
    writing: AtomicBool,
}

impl Persister {
    pub(crate) fn new(name: &'static str, backend: Arc<dyn KeySetStore>) -> Self {
        Self {
            name,
            backend,
            dirty: AtomicBool::new(false),
            writing: AtomicBool::new(false),
        }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn KeySetStore> {
        &self.backend
    }

    /// Mark dirty and start a writer unless one is already running.
    ///
    /// Inside a tokio runtime the writer runs on the blocking pool; without
    /// one it runs inline.
    pub(crate) fn request<S: Snapshot>(owner: &Arc<S>, persister: &Arc<Persister>) {
        persister.dirty.store(true, Ordering::Release);
        if persister
            .writing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let owner = Arc::clone(owner);
        let persister = Arc::clone(persister);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || persister.drain(owner.as_ref()));
            },
            Err(_) => persister.drain(owner.as_ref()),
        }
    }

    fn drain<S: Snapshot>(&self, owner: &S) {
        loop {
            while self.dirty.swap(false, Ordering::AcqRel) {
                let entries = owner.snapshot();
                if let Err(e) = self.backend.persist(&entries) {
                    warn!(store = self.name, error = %e, "Failed to persist store");
                }
            }
            self.writing.store(false, Ordering::Release);
            // A mutation may have landed between the last swap and the release.
            if !self.dirty.load(Ordering::Acquire)
                || self
                    .writing
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                return;
            }
        }
    }
}
