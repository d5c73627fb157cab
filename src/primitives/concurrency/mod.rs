#![forbid(unsafe_code)]
//! Per-page flush locks.
//!
//! A page key is either unlocked or held by exactly one guard. Keys are
//! spread over independently locked shards so unrelated pages never contend
//! on a single mutex; a shard only serializes the bookkeeping, never the
//! critical sections guarded by the page locks themselves.

use std::hash::{Hash, Hasher};

use parking_lot::{Condvar, Mutex};
use rustc_hash::{FxHashSet, FxHasher};

use crate::types::PageKey;

/// Default number of shards in a [`FlushLockTable`].
pub const DEFAULT_LOCK_SHARDS: usize = 64;

/// Table of exclusive locks keyed by `(file, page index)`.
pub struct FlushLockTable {
    shards: Box<[Shard]>,
    mask: usize,
}

struct Shard {
    held: Mutex<FxHashSet<PageKey>>,
    released: Condvar,
}

impl Shard {
    fn new() -> Self {
        Self {
            held: Mutex::new(FxHashSet::default()),
            released: Condvar::new(),
        }
    }
}

/// Guard representing a held page flush lock. Dropping it releases the lock.
#[must_use = "the flush lock is released as soon as the guard is dropped"]
pub struct FlushGuard<'a> {
    table: &'a FlushLockTable,
    key: PageKey,
}

impl FlushLockTable {
    /// Creates a table with `shards` shards, rounded up to a power of two.
    pub fn new(shards: usize) -> Self {
        let count = shards.max(1).next_power_of_two();
        let shards = (0..count).map(|_| Shard::new()).collect::<Vec<_>>();
        Self {
            shards: shards.into_boxed_slice(),
            mask: count - 1,
        }
    }

    fn shard(&self, key: &PageKey) -> &Shard {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) & self.mask]
    }

    /// Acquires the lock for `key`, blocking until it is free.
    ///
    /// The lock is not reentrant: acquiring a key already held by the
    /// calling thread deadlocks.
    pub fn acquire(&self, key: PageKey) -> FlushGuard<'_> {
        let shard = self.shard(&key);
        let mut held = shard.held.lock();
        while held.contains(&key) {
            shard.released.wait(&mut held);
        }
        held.insert(key);
        FlushGuard { table: self, key }
    }

    /// Acquires the lock for `key` only if it is currently free.
    pub fn try_acquire(&self, key: PageKey) -> Option<FlushGuard<'_>> {
        let shard = self.shard(&key);
        let mut held = shard.held.lock();
        if held.insert(key) {
            Some(FlushGuard { table: self, key })
        } else {
            None
        }
    }

    /// Returns true while some guard holds `key`.
    pub fn is_locked(&self, key: PageKey) -> bool {
        self.shard(&key).held.lock().contains(&key)
    }

    /// Number of keys currently locked.
    pub fn held(&self) -> usize {
        self.shards.iter().map(|shard| shard.held.lock().len()).sum()
    }

    fn release(&self, key: PageKey) {
        let shard = self.shard(&key);
        let removed = shard.held.lock().remove(&key);
        debug_assert!(removed, "released a flush lock that was not held");
        shard.released.notify_all();
    }
}

impl Default for FlushLockTable {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_SHARDS)
    }
}

impl<'a> FlushGuard<'a> {
    /// Key protected by this guard.
    pub fn key(&self) -> PageKey {
        self.key
    }

    /// Releases the lock explicitly.
    pub fn release(self) {
        drop(self);
    }

    pub(crate) fn belongs_to(&self, table: &FlushLockTable) -> bool {
        std::ptr::eq(self.table, table)
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.table.release(self.key);
    }
}
