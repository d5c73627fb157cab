use std::fs::File;
use std::path::Path;

use crate::admin::{AdminError, Result};
use crate::primitives::bytes::AlignedBuf;
use crate::primitives::io::{FileIo, StdFileIo};
use crate::primitives::pager::CacheOptions;

/// Read-only view of a page file.
pub(crate) struct PageFile {
    io: StdFileIo,
    len: u64,
    page_size: usize,
}

impl PageFile {
    pub(crate) fn open(path: &Path, page_size: u32) -> Result<Self> {
        CacheOptions {
            page_size,
            ..CacheOptions::default()
        }
        .validate()?;
        if !path.exists() {
            return Err(AdminError::missing_file(path));
        }
        let io = StdFileIo::new(File::open(path)?);
        let len = io.len()?;
        Ok(Self {
            io,
            len,
            page_size: page_size as usize,
        })
    }

    pub(crate) fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of complete pages.
    pub(crate) fn pages(&self) -> u64 {
        self.len / self.page_size as u64
    }

    /// Bytes after the last complete page.
    pub(crate) fn trailing_bytes(&self) -> u64 {
        self.len % self.page_size as u64
    }

    pub(crate) fn read_page(&self, page_index: u64, frame: &mut AlignedBuf) -> Result<()> {
        let offset = page_index * self.page_size as u64;
        self.io.read_at(offset, frame.as_mut_slice())?;
        Ok(())
    }
}
