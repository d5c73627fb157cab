use std::path::{Path, PathBuf};

use crate::types::CacheError;
use thiserror::Error;

/// Error type for administrative operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Page file not found at the specified path.
    #[error("page file not found: {0}")]
    MissingFile(PathBuf),
    /// Requested page lies past the end of the file.
    #[error("page {page_index} is beyond the end of the file ({pages} pages)")]
    PageOutOfRange {
        /// Requested page.
        page_index: u64,
        /// Complete pages in the file.
        pages: u64,
    },
    /// Cache error.
    #[error(transparent)]
    Core(#[from] CacheError),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for administrative operations.
pub type Result<T> = std::result::Result<T, AdminError>;

impl AdminError {
    pub(crate) fn missing_file(path: impl AsRef<Path>) -> Self {
        AdminError::MissingFile(path.as_ref().to_path_buf())
    }
}
