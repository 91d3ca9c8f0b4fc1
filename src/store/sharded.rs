//! Capability store with striped construction locks.
//!
//! Each key hashes (blake3) to one of a fixed set of stripes. Construction for a
//! key runs under its stripe lock only, so registrations for keys on different
//! stripes proceed in parallel. The shared map is locked just long enough to
//! look up or commit an entry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crossbeam_channel::Receiver;

use crate::error::{StoreError, TriggerResult};
use crate::store::traits::{CapabilityStore, Constructor, Entry};

/// Default number of construction stripes.
pub const DEFAULT_STRIPES: usize = 16;

/// Thread-safe capability store with per-stripe construction.
pub struct ShardedCapabilityStore<T, R> {
    entries: RwLock<HashMap<String, Entry<T, R>>>,
    stripes: Vec<Mutex<()>>,
}

impl<T, R> ShardedCapabilityStore<T, R> {
    /// Create a store with [`DEFAULT_STRIPES`] stripes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    /// Create a store with `stripes` construction locks (at least one).
    #[must_use]
    pub fn with_stripes(stripes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Number of construction stripes.
    #[must_use]
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_index(&self, key: &str) -> usize {
        let hash = blake3::hash(key.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        // Stripe count is small; the modulo result always fits in usize.
        #[allow(clippy::cast_possible_truncation)]
        let idx = (u64::from_le_bytes(prefix) % self.stripes.len() as u64) as usize;
        idx
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, Entry<T, R>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry<T, R>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, R> Default for ShardedCapabilityStore<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> fmt::Debug for ShardedCapabilityStore<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedCapabilityStore")
            .field("len", &self.read_entries().len())
            .field("stripes", &self.stripes.len())
            .finish()
    }
}

impl<T, R> CapabilityStore<T, R> for ShardedCapabilityStore<T, R>
where
    T: Send + Sync,
    R: Send,
{
    fn insert_if_not_exists(
        &self,
        key: &str,
        constructor: Constructor<'_, T, R>,
    ) -> TriggerResult<Receiver<R>> {
        // Every insert for `key` goes through this stripe, and the entry is
        // committed before the stripe is released.
        let _stripe = self.stripes[self.stripe_index(key)]
            .lock()
            .map_err(|_| StoreError::Poisoned {
                context: "sharded_store.stripe",
            })?;

        if let Some(existing) = self.read_entries().get(key) {
            return Ok(existing.responses.clone());
        }

        let (record, responses) = constructor()?;
        self.write_entries().insert(
            key.to_string(),
            Entry {
                record,
                responses: responses.clone(),
            },
        );
        Ok(responses)
    }

    fn read(&self, key: &str) -> Option<Arc<T>> {
        self.read_entries().get(key).map(|e| Arc::clone(&e.record))
    }

    fn read_all(&self) -> Vec<Arc<T>> {
        self.read_entries()
            .values()
            .map(|e| Arc::clone(&e.record))
            .collect()
    }

    fn delete(&self, key: &str) {
        self.write_entries().remove(key);
    }

    fn len(&self) -> usize {
        self.read_entries().len()
    }
}
