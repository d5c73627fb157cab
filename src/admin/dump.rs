use std::path::Path;

use serde::Serialize;

use crate::admin::util::PageFile;
use crate::admin::{AdminError, Result};
use crate::primitives::bytes::{le, AlignedBuf};
use crate::primitives::pager::frame::{self, layout, FrameStatus, FRAME_HEADER_LEN};

const PAYLOAD_PREFIX_LEN: usize = 32;

/// Classification of a dumped page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    /// Magic and checksum match.
    Valid,
    /// All zeros; never written.
    Unwritten,
    /// Failed verification.
    Corrupt,
}

/// Header fields and payload prefix of one stored page.
#[derive(Clone, Debug, Serialize)]
pub struct PageDump {
    /// Zero-based page index.
    pub page_index: u64,
    /// Verification outcome.
    pub state: PageState,
    /// Why the frame failed verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    /// Raw header fields, reported even for damaged frames.
    pub magic: u64,
    /// Stored checksum.
    pub crc32: u32,
    /// WAL segment of the stamp.
    pub wal_segment: u32,
    /// WAL position of the stamp.
    pub wal_position: u64,
    /// Hex of the first payload bytes.
    pub payload_prefix: String,
}

/// Decodes page `page_index` of the file at `path`.
pub fn dump_page(path: impl AsRef<Path>, page_size: u32, page_index: u64) -> Result<PageDump> {
    let file = PageFile::open(path.as_ref(), page_size)?;
    if page_index >= file.pages() {
        return Err(AdminError::PageOutOfRange {
            page_index,
            pages: file.pages(),
        });
    }
    let mut frame = AlignedBuf::zeroed(file.page_size());
    file.read_page(page_index, &mut frame)?;
    let bytes = frame.as_slice();
    let (state, reason) = match frame::inspect(bytes) {
        FrameStatus::Valid(_) => (PageState::Valid, None),
        FrameStatus::Unwritten => (PageState::Unwritten, None),
        FrameStatus::Corrupt(reason) => (PageState::Corrupt, Some(reason)),
    };
    let prefix_end = (FRAME_HEADER_LEN + PAYLOAD_PREFIX_LEN).min(bytes.len());
    Ok(PageDump {
        page_index,
        state,
        reason,
        magic: le::get_u64(bytes, layout::MAGIC),
        crc32: le::get_u32(bytes, layout::CRC32),
        wal_segment: le::get_u32(bytes, layout::WAL_SEGMENT),
        wal_position: le::get_u64(bytes, layout::WAL_POSITION),
        payload_prefix: hex::encode(&bytes[FRAME_HEADER_LEN..prefix_end]),
    })
}
