#![forbid(unsafe_code)]
//! Identifiers, sequence numbers and the crate-wide error type.

use std::fmt;

pub mod checksum;

pub use checksum::frame_crc32;

/// Stable numeric identifier of a file opened through the cache.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct FileId(pub u32);

/// Write-ahead log sequence number: a segment plus a position inside it.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Lsn {
    /// WAL segment number.
    pub segment: u32,
    /// Byte offset inside the segment.
    pub position: u64,
}

impl Lsn {
    /// Sequence number stamped when no WAL is configured.
    pub const ZERO: Lsn = Lsn {
        segment: 0,
        position: 0,
    };

    /// Creates a sequence number from its components.
    pub const fn new(segment: u32, position: u64) -> Self {
        Self { segment, position }
    }
}

/// Address of one page: owning file plus zero-based page index.
///
/// Ordering is by file first, then page index, which is the order pages are
/// written during a flush.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageKey {
    /// File the page belongs to.
    pub file_id: FileId,
    /// Position of the page inside the file.
    pub page_index: u64,
}

impl PageKey {
    /// Creates a page key.
    pub const fn new(file_id: FileId, page_index: u64) -> Self {
        Self {
            file_id,
            page_index,
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.position)
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file {} page {}", self.file_id, self.page_index)
    }
}

/// One page that could not be persisted during a flush pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageFlushError {
    /// Page that stayed dirty.
    pub key: PageKey,
    /// Rendered cause of the failure.
    pub reason: String,
}

/// Aggregate outcome of a flush that did not persist every page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushFailure {
    /// Pages that remain dirty, in flush order.
    pub failures: Vec<PageFlushError>,
}

impl FlushFailure {
    /// Returns true when no page failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Keys of the pages that remain dirty.
    pub fn keys(&self) -> impl Iterator<Item = PageKey> + '_ {
        self.failures.iter().map(|failure| failure.key)
    }
}

impl fmt::Display for FlushFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} page(s) failed to flush", self.failures.len())?;
        for (idx, failure) in self.failures.iter().enumerate() {
            let sep = if idx == 0 { ": " } else { "; " };
            write!(f, "{sep}{} ({})", failure.key, failure.reason)?;
        }
        Ok(())
    }
}

/// Errors raised by the cache and its primitives.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// Underlying file system failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Frame failed magic or checksum verification.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Like [`CacheError::Corruption`], with the page address attached.
    #[error("corrupted page {page_index} in file {file_id}: {reason}")]
    PageCorrupted {
        /// File holding the page.
        file_id: FileId,
        /// Index of the damaged page.
        page_index: u64,
        /// Which check failed.
        reason: &'static str,
    },
    /// Id was never issued or the file was deleted.
    #[error("no such file: {0}")]
    NoSuchFile(FileId),
    /// No open or closed file carries this name.
    #[error("no file named {0:?}")]
    UnknownFileName(String),
    /// File is registered but its handle was released.
    #[error("file {0} is closed")]
    FileClosed(FileId),
    /// Bad argument or option combination.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// The cache was closed.
    #[error("cache is closed")]
    Closed,
    /// Some pages could not be persisted; they stay dirty.
    #[error("flush failed: {0}")]
    Flush(FlushFailure),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Attaches a page address to a bare corruption error.
    pub fn at_page(self, key: PageKey) -> Self {
        match self {
            CacheError::Corruption(reason) => CacheError::PageCorrupted {
                file_id: key.file_id,
                page_index: key.page_index,
                reason,
            },
            other => other,
        }
    }

    /// Returns true for magic/checksum style failures.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CacheError::Corruption(_) | CacheError::PageCorrupted { .. }
        )
    }
}
