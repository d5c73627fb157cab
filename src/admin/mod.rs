#![forbid(unsafe_code)]

//! Offline inspection of page files.
//!
//! These functions read a backing file directly, without a running cache,
//! and classify every page-sized region as a valid frame, an unwritten gap
//! or a damaged frame.

mod dump;
mod error;
mod util;
mod verify;

/// Decoding of a single stored page.
pub use dump::{dump_page, PageDump, PageState};

/// Error types for administrative operations.
pub use error::{AdminError, Result};

/// Whole-file frame verification.
pub use verify::{verify_file, VerifyCounts, VerifyFinding, VerifyReport, VerifySeverity};
