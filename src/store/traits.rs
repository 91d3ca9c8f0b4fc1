//! Abstract capability store trait.
//!
//! A capability store maps a trigger id to a running trigger record and the
//! receiving end of its response channel. The locking strategy is an
//! implementation detail: callers only rely on the at-most-once construction
//! guarantee of [`CapabilityStore::insert_if_not_exists`].

use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::error::TriggerResult;

/// Builds a new record and its response channel.
///
/// Runs at most once per key, and only when the key is absent.
pub type Constructor<'a, T, R> = Box<dyn FnOnce() -> TriggerResult<(Arc<T>, Receiver<R>)> + 'a>;

/// Keyed store of trigger records.
///
/// # Concurrency
/// - `insert_if_not_exists` serializes check, construct and commit for a key:
///   concurrent callers with the same key observe exactly one constructor run
///   and all receive the same channel.
/// - Records are only committed after construction succeeds, so a failed (or
///   panicking) constructor never leaves a partial entry behind. Read paths
///   therefore recover from a poisoned lock instead of failing.
pub trait CapabilityStore<T, R>: Send + Sync {
    /// Returns the existing response channel for `key`, or runs `constructor`
    /// and commits its result.
    ///
    /// # Errors
    /// - Whatever the constructor returned; the key stays absent.
    /// - `StoreError::Poisoned` if a previous constructor panicked while holding
    ///   the insertion lock.
    fn insert_if_not_exists(
        &self,
        key: &str,
        constructor: Constructor<'_, T, R>,
    ) -> TriggerResult<Receiver<R>>;

    /// Non-blocking lookup of a record.
    fn read(&self, key: &str) -> Option<Arc<T>>;

    /// Snapshot of all current records.
    fn read_all(&self) -> Vec<Arc<T>>;

    /// Removes `key` without closing its record. Absent keys are ignored.
    fn delete(&self, key: &str);

    /// Number of registered keys.
    fn len(&self) -> usize;

    /// Returns true if no keys are registered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A committed store entry.
#[derive(Debug)]
pub(crate) struct Entry<T, R> {
    pub record: Arc<T>,
    pub responses: Receiver<R>,
}
