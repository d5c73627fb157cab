//! On-disk page frame: magic, CRC-32, WAL stamp, payload.
//!
//! ```text
//! 0        8        12       16               24            page_size
//! | magic  | crc32  | wal seg| wal position   | payload ... |
//!                   |<------------- crc32 coverage -------->|
//! ```
//!
//! All integers are little-endian. The checksum covers the WAL stamp so a
//! frame whose durability metadata was damaged independently of its payload
//! is rejected as well.

use core::ops::Range;

use crate::primitives::bytes::le;
use crate::types::{frame_crc32, CacheError, Lsn, Result};

/// Sentinel written at offset 0 of every completed frame.
pub const FRAME_MAGIC: u64 = 0xFACB_03FE;
/// Bytes reserved in front of the payload.
pub const FRAME_HEADER_LEN: usize = 24;

pub mod layout {
    //! Byte offsets of the fixed frame fields.
    use core::ops::Range;

    /// [`super::FRAME_MAGIC`], u64.
    pub const MAGIC: Range<usize> = 0..8;
    /// CRC-32 of `CHECKSUM_START..page_size`, u32.
    pub const CRC32: Range<usize> = 8..12;
    /// WAL segment, u32.
    pub const WAL_SEGMENT: Range<usize> = 12..16;
    /// WAL position, u64.
    pub const WAL_POSITION: Range<usize> = 16..24;
    /// First byte covered by the checksum.
    pub const CHECKSUM_START: usize = 12;
}

/// Payload capacity of a frame of `page_size` bytes.
pub const fn payload_len(page_size: usize) -> usize {
    page_size.saturating_sub(FRAME_HEADER_LEN)
}

/// Range of payload bytes inside a frame of `page_size` bytes.
pub const fn payload_range(page_size: usize) -> Range<usize> {
    FRAME_HEADER_LEN..page_size
}

/// A verified frame borrowed from a page-sized byte slice.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    /// WAL sequence number stamped at flush time.
    pub lsn: Lsn,
    /// Stored checksum (already verified).
    pub crc32: u32,
    /// Logical page content.
    pub payload: &'a [u8],
}

/// Classification of a page-sized region read back from disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// Complete frame with matching magic and checksum.
    Valid(Lsn),
    /// Never written: every byte is zero.
    Unwritten,
    /// Torn or damaged frame.
    Corrupt(&'static str),
}

/// Stamps the header of `frame` in place; the payload must already sit at
/// `frame[FRAME_HEADER_LEN..]`.
pub fn encode_into(frame: &mut [u8], lsn: Lsn) -> Result<()> {
    if frame.len() <= FRAME_HEADER_LEN {
        return Err(CacheError::Invalid("frame smaller than header"));
    }
    le::put_u64(frame, layout::MAGIC, FRAME_MAGIC);
    le::put_u32(frame, layout::WAL_SEGMENT, lsn.segment);
    le::put_u64(frame, layout::WAL_POSITION, lsn.position);
    let crc = frame_crc32(&frame[layout::CHECKSUM_START..]);
    le::put_u32(frame, layout::CRC32, crc);
    Ok(())
}

/// Builds a complete frame around `payload`.
pub fn encode(payload: &[u8], lsn: Lsn) -> Result<Vec<u8>> {
    let mut frame = vec![0u8; FRAME_HEADER_LEN + payload.len()];
    frame[FRAME_HEADER_LEN..].copy_from_slice(payload);
    encode_into(&mut frame, lsn)?;
    Ok(frame)
}

/// Verifies magic and checksum and returns the frame contents.
pub fn decode(frame: &[u8]) -> Result<DecodedFrame<'_>> {
    if frame.len() <= FRAME_HEADER_LEN {
        return Err(CacheError::Corruption("frame truncated"));
    }
    if le::get_u64(frame, layout::MAGIC) != FRAME_MAGIC {
        return Err(CacheError::Corruption("invalid frame magic"));
    }
    let stored = le::get_u32(frame, layout::CRC32);
    if frame_crc32(&frame[layout::CHECKSUM_START..]) != stored {
        return Err(CacheError::Corruption("frame checksum mismatch"));
    }
    Ok(DecodedFrame {
        lsn: Lsn::new(
            le::get_u32(frame, layout::WAL_SEGMENT),
            le::get_u64(frame, layout::WAL_POSITION),
        ),
        crc32: stored,
        payload: &frame[FRAME_HEADER_LEN..],
    })
}

/// Returns true when the region was never written.
pub fn is_unwritten(frame: &[u8]) -> bool {
    frame.iter().all(|&b| b == 0)
}

/// Classifies a region read from disk without failing.
pub fn inspect(frame: &[u8]) -> FrameStatus {
    if is_unwritten(frame) {
        return FrameStatus::Unwritten;
    }
    match decode(frame) {
        Ok(decoded) => FrameStatus::Valid(decoded.lsn),
        Err(CacheError::Corruption(reason)) => FrameStatus::Corrupt(reason),
        Err(_) => FrameStatus::Corrupt("undecodable frame"),
    }
}
