#![forbid(unsafe_code)]
//! Fixed-width field helpers and aligned scratch buffers for page I/O.

pub mod le {
    //! Little-endian accessors for fixed-offset frame fields.

    use core::convert::TryInto;
    use core::ops::Range;

    /// Writes `v` into `dst[range]`; the range must be 4 bytes wide.
    pub fn put_u32(dst: &mut [u8], range: Range<usize>, v: u32) {
        dst[range].copy_from_slice(&v.to_le_bytes());
    }

    /// Writes `v` into `dst[range]`; the range must be 8 bytes wide.
    pub fn put_u64(dst: &mut [u8], range: Range<usize>, v: u64) {
        dst[range].copy_from_slice(&v.to_le_bytes());
    }

    /// Reads a u32 from `src[range]`.
    pub fn get_u32(src: &[u8], range: Range<usize>) -> u32 {
        let bytes: [u8; 4] = src[range]
            .try_into()
            .unwrap_or_else(|_| panic!("u32 field must be 4 bytes wide"));
        u32::from_le_bytes(bytes)
    }

    /// Reads a u64 from `src[range]`.
    pub fn get_u64(src: &[u8], range: Range<usize>) -> u64 {
        let bytes: [u8; 8] = src[range]
            .try_into()
            .unwrap_or_else(|_| panic!("u64 field must be 8 bytes wide"));
        u64::from_le_bytes(bytes)
    }
}

/// Alignment required by `O_DIRECT` transfers.
pub const DIRECT_IO_ALIGN: usize = 4096;

/// Heap buffer whose usable window starts at an aligned address.
///
/// Over-allocates by one alignment unit and exposes the aligned sub-slice,
/// so no unsafe allocation is needed.
pub struct AlignedBuf {
    raw: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedBuf {
    /// Allocates a zeroed buffer of `len` bytes aligned to [`DIRECT_IO_ALIGN`].
    pub fn zeroed(len: usize) -> Self {
        Self::with_alignment(len, DIRECT_IO_ALIGN)
    }

    /// Allocates a zeroed buffer of `len` bytes aligned to `align`.
    pub fn with_alignment(len: usize, align: usize) -> Self {
        let align = align.max(1);
        let raw = vec![0u8; len + align];
        let offset = raw.as_ptr().align_offset(align);
        debug_assert!(offset < align);
        Self { raw, offset, len }
    }

    /// Length of the usable window.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true for a zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Usable bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.raw[self.offset..self.offset + self.len]
    }

    /// Usable bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.raw[self.offset..self.offset + self.len]
    }
}
