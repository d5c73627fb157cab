use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::admin::util::PageFile;
use crate::admin::Result;
use crate::primitives::bytes::AlignedBuf;
use crate::primitives::pager::{frame, FrameStatus};

const MAX_FINDINGS: usize = 32;

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational message about the verification process.
    Info,
    /// Non-critical issue that may indicate a problem.
    Warning,
    /// Damaged or torn frame.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Page the finding refers to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_index: Option<u64>,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Page classification totals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerifyCounts {
    /// Complete page-sized regions examined.
    pub pages_scanned: u64,
    /// Frames with matching magic and checksum.
    pub valid_pages: u64,
    /// All-zero regions that were never written.
    pub unwritten_pages: u64,
    /// Frames failing verification.
    pub corrupt_pages: u64,
    /// Bytes after the last complete page.
    pub trailing_bytes: u64,
}

/// Complete report of a verification operation.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// Page size the file was scanned with.
    pub page_size: u32,
    /// Whether no damaged frame was found.
    pub success: bool,
    /// Issues discovered, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Page classification totals.
    pub counts: VerifyCounts,
}

/// Checks every page frame of the file at `path`.
///
/// Unwritten gaps are counted but are not failures. A trailing partial page
/// is reported as a warning.
///
/// # Errors
///
/// Returns an error if the file does not exist, `page_size` is invalid or
/// reading fails.
pub fn verify_file(path: impl AsRef<Path>, page_size: u32) -> Result<VerifyReport> {
    let file = PageFile::open(path.as_ref(), page_size)?;
    let mut frame = AlignedBuf::zeroed(file.page_size());
    let mut findings = Vec::new();
    let mut counts = VerifyCounts {
        trailing_bytes: file.trailing_bytes(),
        ..VerifyCounts::default()
    };

    for page_index in 0..file.pages() {
        file.read_page(page_index, &mut frame)?;
        counts.pages_scanned += 1;
        match frame::inspect(frame.as_slice()) {
            FrameStatus::Valid(_) => counts.valid_pages += 1,
            FrameStatus::Unwritten => counts.unwritten_pages += 1,
            FrameStatus::Corrupt(reason) => {
                counts.corrupt_pages += 1;
                push_finding(
                    &mut findings,
                    VerifySeverity::Error,
                    Some(page_index),
                    format!("page {page_index}: {reason}"),
                );
            }
        }
    }
    if counts.trailing_bytes > 0 {
        push_finding(
            &mut findings,
            VerifySeverity::Warning,
            Some(file.pages()),
            format!("{} trailing bytes after the last complete page", counts.trailing_bytes),
        );
    }
    if counts.corrupt_pages as usize > MAX_FINDINGS {
        findings.push(VerifyFinding {
            severity: VerifySeverity::Info,
            page_index: None,
            message: format!(
                "{} further corrupt pages not listed",
                counts.corrupt_pages as usize - MAX_FINDINGS
            ),
        });
    }
    debug!(
        pages = counts.pages_scanned,
        corrupt = counts.corrupt_pages,
        "wbcache.admin.verify"
    );

    Ok(VerifyReport {
        page_size,
        success: counts.corrupt_pages == 0,
        findings,
        counts,
    })
}

fn push_finding(
    findings: &mut Vec<VerifyFinding>,
    severity: VerifySeverity,
    page_index: Option<u64>,
    message: String,
) {
    if findings.len() < MAX_FINDINGS {
        findings.push(VerifyFinding {
            severity,
            page_index,
            message,
        });
    }
}
