use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::types::PageFlushError;

/// Point-in-time counters of a write-back cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Pages installed through `put`.
    pub puts: u64,
    /// `get` calls answered from the dirty table.
    pub get_hits: u64,
    /// `get` calls that found no dirty entry.
    pub get_misses: u64,
    /// Pages written and removed from the dirty table.
    pub pages_flushed: u64,
    /// Page flush attempts that failed.
    pub flush_failures: u64,
    /// Explicit flush passes (`flush`, `flush_file`, `close_file`).
    pub flush_passes: u64,
    /// Passes run by the background worker.
    pub background_passes: u64,
    /// Pages currently waiting to be persisted.
    pub dirty_pages: u64,
    /// Files with an open handle.
    pub open_files: u64,
}

/// Receives reports about background flush failures.
pub trait FlushObserver: Send + Sync {
    /// Called every time the background worker fails to persist a page.
    /// `consecutive` counts the failures of that page since it was last
    /// flushed successfully.
    fn on_page_flush_failed(&self, failure: &PageFlushError, consecutive: u32);
}

/// A [`FlushObserver`] that ignores every report.
#[derive(Default)]
pub struct NoopObserver;

impl FlushObserver for NoopObserver {
    fn on_page_flush_failed(&self, _failure: &PageFlushError, _consecutive: u32) {}
}

#[derive(Default)]
pub(crate) struct CacheCounters {
    pub puts: AtomicU64,
    pub get_hits: AtomicU64,
    pub get_misses: AtomicU64,
    pub pages_flushed: AtomicU64,
    pub flush_failures: AtomicU64,
    pub flush_passes: AtomicU64,
    pub background_passes: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, dirty_pages: usize, open_files: usize) -> CacheStats {
        CacheStats {
            puts: self.puts.load(Ordering::Relaxed),
            get_hits: self.get_hits.load(Ordering::Relaxed),
            get_misses: self.get_misses.load(Ordering::Relaxed),
            pages_flushed: self.pages_flushed.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            flush_passes: self.flush_passes.load(Ordering::Relaxed),
            background_passes: self.background_passes.load(Ordering::Relaxed),
            dirty_pages: dirty_pages as u64,
            open_files: open_files as u64,
        }
    }
}
