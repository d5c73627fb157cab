#![forbid(unsafe_code)]
//! Page-sized buffer allocator collaborator.
//!
//! Buffers are opaque [`BufferRef`]s; contents are only reachable through
//! ranged reads and writes so an allocator may keep them off-heap.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::types::{CacheError, Result};

/// Opaque handle to a buffer owned by a [`PageAllocator`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct BufferRef(pub u64);

impl fmt::Display for BufferRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// Thread-safe source of fixed-size byte buffers.
pub trait PageAllocator: Send + Sync + 'static {
    /// Allocates a zeroed buffer of `size` bytes.
    fn allocate(&self, size: usize) -> Result<BufferRef>;
    /// Returns a buffer to the allocator. Unknown refs are ignored.
    fn free(&self, buf: BufferRef);
    /// Copies `dst.len()` bytes starting at `offset` out of the buffer.
    fn read_range(&self, buf: BufferRef, offset: usize, dst: &mut [u8]) -> Result<()>;
    /// Copies `src` into the buffer starting at `offset`.
    fn write_range(&self, buf: BufferRef, offset: usize, src: &[u8]) -> Result<()>;
}

/// Heap-backed [`PageAllocator`].
#[derive(Default)]
pub struct HeapAllocator {
    buffers: RwLock<FxHashMap<BufferRef, Arc<Mutex<Box<[u8]>>>>>,
    next_id: AtomicU64,
}

impl HeapAllocator {
    /// Creates an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffers allocated and not yet freed.
    pub fn live_buffers(&self) -> usize {
        self.buffers.read().len()
    }

    fn lookup(&self, buf: BufferRef) -> Result<Arc<Mutex<Box<[u8]>>>> {
        self.buffers
            .read()
            .get(&buf)
            .cloned()
            .ok_or(CacheError::Invalid("unknown buffer"))
    }
}

fn checked_window(len: usize, offset: usize, count: usize) -> Result<std::ops::Range<usize>> {
    let end = offset
        .checked_add(count)
        .ok_or(CacheError::Invalid("buffer range overflow"))?;
    if end > len {
        return Err(CacheError::Invalid("buffer range out of bounds"));
    }
    Ok(offset..end)
}

impl PageAllocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<BufferRef> {
        if size == 0 {
            return Err(CacheError::Invalid("zero-sized buffer"));
        }
        let id = BufferRef(self.next_id.fetch_add(1, Ordering::Relaxed));
        let data = vec![0u8; size].into_boxed_slice();
        self.buffers.write().insert(id, Arc::new(Mutex::new(data)));
        Ok(id)
    }

    fn free(&self, buf: BufferRef) {
        self.buffers.write().remove(&buf);
    }

    fn read_range(&self, buf: BufferRef, offset: usize, dst: &mut [u8]) -> Result<()> {
        let slot = self.lookup(buf)?;
        let data = slot.lock();
        let window = checked_window(data.len(), offset, dst.len())?;
        dst.copy_from_slice(&data[window]);
        Ok(())
    }

    fn write_range(&self, buf: BufferRef, offset: usize, src: &[u8]) -> Result<()> {
        let slot = self.lookup(buf)?;
        let mut data = slot.lock();
        let window = checked_window(data.len(), offset, src.len())?;
        data[window].copy_from_slice(src);
        Ok(())
    }
}
