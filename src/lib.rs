//! Write-back page cache with per-page flush locking, checksummed on-disk
//! frames and write-ahead log coordination.

#![warn(missing_docs)]

/// Offline verification and page dumps of stored files.
pub mod admin;
/// Subscriber setup for the CLI and embedders.
pub mod logging;
/// Allocation, I/O, locking and the cache itself.
pub mod primitives;
/// Identifiers and the crate error type.
pub mod types;

pub use primitives::alloc::{BufferRef, HeapAllocator, PageAllocator};
pub use primitives::concurrency::FlushGuard;
pub use primitives::pager::{
    CacheOptions, CacheStats, FlushObserver, NoopObserver, PageBuffer, PageIntegrityIssue,
    WriteBackCache,
};
pub use primitives::wal::{LsnCell, WalSource};
pub use types::{CacheError, FileId, FlushFailure, Lsn, PageFlushError, PageKey, Result};
