//! Low-level primitives for building the write-back cache.
//!
//! Includes byte utilities, page buffer allocation, I/O operations,
//! per-page locking, the write-ahead log interface and the cache itself.

/// Page buffer allocation.
///
/// The allocator interface page buffers are carved from, plus a heap-backed
/// implementation.
pub mod alloc;

/// Byte-level utilities and encoding/decoding.
///
/// Little-endian field access and aligned scratch buffers.
pub mod bytes;

/// Concurrency primitives and synchronization.
pub mod concurrency;

/// I/O abstractions and utilities.
///
/// Interfaces for reading/writing data and file operations.
pub mod io;

/// Write-back paging subsystem.
///
/// Buffers modified pages and persists them as checksummed frames.
pub mod pager;

/// Write-ahead log interface consumed by the cache.
pub mod wal;
