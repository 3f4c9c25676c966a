//! Shared, swappable view of the loaded search index.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::semantic::index::SearchIndex;
use crate::semantic::storage::{IndexStorage, StorageError};

/// Readers clone the current `Arc` and query it without holding the lock;
/// a reload replaces the whole index at once.
pub struct IndexSnapshot {
    current: RwLock<Arc<SearchIndex>>,
    /// Set once an index document has been loaded; an empty document counts
    loaded: AtomicBool,
}

impl IndexSnapshot {
    /// Snapshot over an index that was loaded successfully.
    pub fn new(index: SearchIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
            loaded: AtomicBool::new(true),
        }
    }

    /// Empty snapshot waiting for its first successful reload.
    pub fn unloaded() -> Self {
        Self {
            current: RwLock::new(Arc::new(SearchIndex::new())),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn current(&self) -> Arc<SearchIndex> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, index: SearchIndex) {
        let index = Arc::new(index);
        match self.current.write() {
            Ok(mut guard) => *guard = index,
            Err(poisoned) => *poisoned.into_inner() = index,
        }
    }

    /// Load the index document and swap it in. On error the previous index
    /// stays in place.
    pub fn reload(&self, storage: &IndexStorage) -> Result<usize, StorageError> {
        let index = storage.load()?;
        let count = index.len();
        self.replace(index);
        self.loaded.store(true, Ordering::Release);
        Ok(count)
    }
}
