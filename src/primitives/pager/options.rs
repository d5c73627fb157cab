use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::frame::FRAME_HEADER_LEN;
use crate::primitives::bytes::DIRECT_IO_ALIGN;
use crate::types::{CacheError, Result};

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: u32 = 4096;
/// Largest accepted page size.
pub const MAX_PAGE_SIZE: u32 = 64 * 1024 * 1024;

/// Configuration options for the write-back cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Size of each page frame in bytes, header included.
    pub page_size: u32,
    /// Whether every flush batch ends with a durable sync of the file.
    pub sync_on_flush: bool,
    /// Time between background flush passes in milliseconds.
    pub flush_interval_ms: u64,
    /// Maximum pages persisted by one background pass.
    pub flush_batch_pages: usize,
    /// Number of files flushed in parallel by one pass.
    pub flush_workers: usize,
    /// Open backing files bypassing the OS page cache.
    pub direct_io: bool,
    /// Run the periodic background flush worker.
    pub background_flush: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            sync_on_flush: true,
            flush_interval_ms: 100,
            flush_batch_pages: 4096,
            flush_workers: 1,
            direct_io: false,
            background_flush: true,
        }
    }
}

impl CacheOptions {
    /// Rejects invalid option combinations.
    pub fn validate(&self) -> Result<()> {
        if (self.page_size as usize) <= FRAME_HEADER_LEN {
            return Err(CacheError::Invalid("page size must exceed the frame header"));
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(CacheError::Invalid("page size exceeds 64 MiB"));
        }
        if self.flush_interval_ms == 0 {
            return Err(CacheError::Invalid("flush interval must be non-zero"));
        }
        if self.flush_batch_pages == 0 {
            return Err(CacheError::Invalid("flush batch must be non-zero"));
        }
        if self.flush_workers == 0 {
            return Err(CacheError::Invalid("flush workers must be non-zero"));
        }
        if self.direct_io && (self.page_size as usize) % DIRECT_IO_ALIGN != 0 {
            return Err(CacheError::Invalid(
                "direct I/O requires a page size multiple of 4096",
            ));
        }
        Ok(())
    }

    /// Parses options from a TOML snippet; absent keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: CacheOptions =
            toml::from_str(text).map_err(|_| CacheError::Invalid("malformed cache options"))?;
        options.validate()?;
        Ok(options)
    }

    /// Background flush interval.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub(crate) fn page_len(&self) -> usize {
        self.page_size as usize
    }
}
