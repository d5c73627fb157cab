//! Reference-counted handle to an allocator-owned page buffer.

use std::fmt;
use std::sync::Arc;

use crate::primitives::alloc::{BufferRef, PageAllocator};
use crate::types::{CacheError, Result};

/// Shared handle to one page-sized buffer.
///
/// Cloning (or [`PageBuffer::retain`]) adds a referrer; dropping (or
/// [`PageBuffer::release`]) removes one. The buffer goes back to its
/// allocator when the last referrer is gone, on every exit path.
#[derive(Clone)]
pub struct PageBuffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    allocator: Arc<dyn PageAllocator>,
    buffer: BufferRef,
    len: usize,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        self.allocator.free(self.buffer);
    }
}

impl PageBuffer {
    /// Takes ownership of `buffer`, which must be `len` bytes long.
    /// The returned handle is the only referrer.
    pub fn acquire(allocator: Arc<dyn PageAllocator>, buffer: BufferRef, len: usize) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                allocator,
                buffer,
                len,
            }),
        }
    }

    /// Allocates a zeroed buffer of `len` bytes and wraps it.
    pub fn allocate(allocator: Arc<dyn PageAllocator>, len: usize) -> Result<Self> {
        let buffer = allocator.allocate(len)?;
        Ok(Self::acquire(allocator, buffer, len))
    }

    /// Allocates a buffer holding a copy of `bytes`.
    pub fn from_bytes(allocator: Arc<dyn PageAllocator>, bytes: &[u8]) -> Result<Self> {
        let page = Self::allocate(allocator, bytes.len())?;
        page.write(0, bytes)?;
        Ok(page)
    }

    /// Adds a referrer.
    pub fn retain(&self) -> Self {
        self.clone()
    }

    /// Removes this referrer.
    pub fn release(self) {
        drop(self);
    }

    /// Number of live referrers.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Opaque allocator reference backing this page.
    pub fn data_pointer(&self) -> BufferRef {
        self.inner.buffer
    }

    /// Page size in bytes.
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Returns true for a zero-length page, which the allocator never hands out.
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Returns true if both handles refer to the same buffer.
    pub fn same_buffer(&self, other: &PageBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copies `dst.len()` bytes starting at `offset`.
    pub fn read_into(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.inner
            .allocator
            .read_range(self.inner.buffer, offset, dst)
    }

    /// Returns `len` bytes starting at `offset`.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.read_into(offset, &mut out)?;
        Ok(out)
    }

    /// Returns the whole page.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.read(0, self.inner.len)
    }

    /// Overwrites bytes starting at `offset`.
    pub fn write(&self, offset: usize, src: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(src.len())
            .ok_or(CacheError::Invalid("page write overflow"))?;
        if end > self.inner.len {
            return Err(CacheError::Invalid("page write out of bounds"));
        }
        self.inner
            .allocator
            .write_range(self.inner.buffer, offset, src)
    }
}

impl fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBuffer")
            .field("buffer", &self.inner.buffer)
            .field("len", &self.inner.len)
            .field("refs", &self.ref_count())
            .finish()
    }
}
