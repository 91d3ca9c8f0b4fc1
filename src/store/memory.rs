//! In-memory capability store with one coarse insertion lock.
//!
//! The whole check-construct-commit sequence runs under a single mutex, so
//! registrations serialize fully, even across different keys. The map itself
//! sits behind its own `RwLock`, taken only for lookups and the commit, so
//! reads never wait on a constructor. See [`ShardedCapabilityStore`] for
//! per-stripe construction.
//!
//! [`ShardedCapabilityStore`]: crate::store::ShardedCapabilityStore

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crossbeam_channel::Receiver;

use crate::error::{StoreError, TriggerResult};
use crate::store::traits::{CapabilityStore, Constructor, Entry};

/// Thread-safe in-memory capability store.
pub struct InMemoryCapabilityStore<T, R> {
    insert_lock: Mutex<()>,
    entries: RwLock<HashMap<String, Entry<T, R>>>,
}

impl<T, R> InMemoryCapabilityStore<T, R> {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            insert_lock: Mutex::new(()),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn entries(&self) -> RwLockReadGuard<'_, HashMap<String, Entry<T, R>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry<T, R>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, R> Default for InMemoryCapabilityStore<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> fmt::Debug for InMemoryCapabilityStore<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCapabilityStore")
            .field("len", &self.entries().len())
            .finish()
    }
}

impl<T, R> CapabilityStore<T, R> for InMemoryCapabilityStore<T, R>
where
    T: Send + Sync,
    R: Send,
{
    fn insert_if_not_exists(
        &self,
        key: &str,
        constructor: Constructor<'_, T, R>,
    ) -> TriggerResult<Receiver<R>> {
        let _insert = self.insert_lock.lock().map_err(|_| StoreError::Poisoned {
            context: "capability_store.insert_if_not_exists",
        })?;

        if let Some(existing) = self.entries().get(key) {
            return Ok(existing.responses.clone());
        }

        let (record, responses) = constructor()?;
        self.entries_mut().insert(
            key.to_string(),
            Entry {
                record,
                responses: responses.clone(),
            },
        );
        Ok(responses)
    }

    fn read(&self, key: &str) -> Option<Arc<T>> {
        self.entries().get(key).map(|e| Arc::clone(&e.record))
    }

    fn read_all(&self) -> Vec<Arc<T>> {
        self.entries()
            .values()
            .map(|e| Arc::clone(&e.record))
            .collect()
    }

    fn delete(&self, key: &str) {
        self.entries_mut().remove(key);
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}
