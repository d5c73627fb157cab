#![forbid(unsafe_code)]
//! Frame checksums.

use crc32fast::Hasher;

/// CRC-32 (IEEE) of a frame's checksummed region: the WAL stamp through the
/// end of the payload.
pub fn frame_crc32(covered: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(covered);
    hasher.finalize()
}
