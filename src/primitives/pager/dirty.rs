//! Ordered table of pages waiting to be persisted.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::buffer::PageBuffer;
use crate::types::{FileId, Lsn, PageKey};

/// Current content of one dirty page.
#[derive(Clone, Debug)]
pub struct DirtyEntry {
    /// Page content; holding the entry holds a reference.
    pub buffer: PageBuffer,
    /// WAL sequence number in effect when the page was last put.
    pub lsn: Lsn,
    /// Monotonic install counter; changes on every put, even when the same
    /// buffer is put again after being modified in place.
    pub version: u64,
}

/// Map from page key to its latest dirty content.
///
/// Every operation is a short critical section on one mutex; none of them
/// perform I/O. Handles displaced by `put` or removed from the table are
/// dropped only after the mutex is released.
#[derive(Default)]
pub struct DirtyPageTable {
    entries: Mutex<BTreeMap<PageKey, DirtyEntry>>,
    next_version: AtomicU64,
}

impl DirtyPageTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `buffer` as the content of `key`, superseding any previous
    /// entry. Returns the version assigned to the new entry.
    pub fn put(&self, key: PageKey, buffer: PageBuffer, lsn: Lsn) -> u64 {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = {
            let mut entries = self.entries.lock();
            entries.insert(
                key,
                DirtyEntry {
                    buffer,
                    lsn,
                    version,
                },
            )
        };
        drop(previous);
        version
    }

    /// Returns a copy of the entry for `key`, adding a buffer referrer.
    pub fn peek(&self, key: PageKey) -> Option<DirtyEntry> {
        self.entries.lock().get(&key).cloned()
    }

    /// Returns true if `key` has a pending entry.
    pub fn contains(&self, key: PageKey) -> bool {
        self.entries.lock().contains_key(&key)
    }

    /// All entries in ascending key order.
    pub fn drain_snapshot(&self) -> Vec<(PageKey, DirtyEntry)> {
        self.entries
            .lock()
            .iter()
            .map(|(key, entry)| (*key, entry.clone()))
            .collect()
    }

    /// Entries of one file in ascending page order.
    pub fn file_snapshot(&self, file_id: FileId) -> Vec<(PageKey, DirtyEntry)> {
        self.entries
            .lock()
            .range(file_range(file_id))
            .map(|(key, entry)| (*key, entry.clone()))
            .collect()
    }

    /// Up to `limit` entries starting at the first key `>= start`, wrapping
    /// around to the lowest keys when the end of the table is reached.
    pub fn snapshot_from(&self, start: PageKey, limit: usize) -> Vec<(PageKey, DirtyEntry)> {
        let entries = self.entries.lock();
        entries
            .range(start..)
            .chain(entries.range(..start))
            .take(limit)
            .map(|(key, entry)| (*key, entry.clone()))
            .collect()
    }

    /// Removes `key` only if its entry still carries `version`. Returns true
    /// when the entry was removed.
    pub fn remove_if_unchanged(&self, key: PageKey, version: u64) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            let unchanged = entries
                .get(&key)
                .is_some_and(|entry| entry.version == version);
            if unchanged {
                entries.remove(&key)
            } else {
                None
            }
        };
        removed.is_some()
    }

    /// Drops every entry of `file_id` without persisting it.
    pub fn discard_file(&self, file_id: FileId) -> usize {
        let discarded: Vec<DirtyEntry> = {
            let mut entries = self.entries.lock();
            let keys: Vec<PageKey> = entries
                .range(file_range(file_id))
                .map(|(key, _)| *key)
                .collect();
            keys.iter().filter_map(|key| entries.remove(key)).collect()
        };
        discarded.len()
    }

    /// Highest dirty page index of `file_id`.
    pub fn max_page_index(&self, file_id: FileId) -> Option<u64> {
        self.entries
            .lock()
            .range(file_range(file_id))
            .next_back()
            .map(|(key, _)| key.page_index)
    }

    /// Number of dirty pages of `file_id`.
    pub fn file_len(&self, file_id: FileId) -> usize {
        self.entries.lock().range(file_range(file_id)).count()
    }

    /// Number of dirty pages.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true when nothing is dirty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn file_range(file_id: FileId) -> (Bound<PageKey>, Bound<PageKey>) {
    (
        Bound::Included(PageKey::new(file_id, 0)),
        Bound::Included(PageKey::new(file_id, u64::MAX)),
    )
}
