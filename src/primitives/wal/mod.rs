#![forbid(unsafe_code)]
//! Write-ahead log collaborator consumed by the write-back cache.
//!
//! The cache never appends to the log. It stamps each dirty page with the
//! sequence number current at the time of the write, and before a page
//! stamped with `L` reaches the data file it asks the log to make everything
//! up to `L` durable.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::types::{Lsn, Result};

/// Read-mostly view of a write-ahead log.
pub trait WalSource: Send + Sync + 'static {
    /// Latest sequence number issued by the log.
    fn current_lsn(&self) -> Lsn;

    /// Highest sequence number known to be durable.
    fn durable_lsn(&self) -> Lsn {
        self.current_lsn()
    }

    /// Makes every record up to and including `lsn` durable.
    fn flush_up_to(&self, _lsn: Lsn) -> Result<()> {
        Ok(())
    }
}

/// In-memory [`WalSource`] whose position is advanced by the embedder.
///
/// `flush_up_to` marks the requested sequence number durable, so the cell
/// also records how far data-file writes have forced the log.
#[derive(Debug, Default)]
pub struct LsnCell {
    current: Mutex<Lsn>,
    durable: Mutex<Lsn>,
    flush_requests: AtomicU64,
}

impl LsnCell {
    /// Creates a cell positioned at `lsn`, nothing durable yet.
    pub fn new(lsn: Lsn) -> Self {
        Self {
            current: Mutex::new(lsn),
            durable: Mutex::new(Lsn::ZERO),
            flush_requests: AtomicU64::new(0),
        }
    }

    /// Moves the current position; never goes backwards.
    pub fn advance(&self, lsn: Lsn) {
        let mut current = self.current.lock();
        if lsn > *current {
            *current = lsn;
        }
    }

    /// Number of `flush_up_to` calls that had to advance durability.
    pub fn flush_requests(&self) -> u64 {
        self.flush_requests.load(Ordering::Relaxed)
    }
}

impl WalSource for LsnCell {
    fn current_lsn(&self) -> Lsn {
        *self.current.lock()
    }

    fn durable_lsn(&self) -> Lsn {
        *self.durable.lock()
    }

    fn flush_up_to(&self, lsn: Lsn) -> Result<()> {
        let mut durable = self.durable.lock();
        if lsn > *durable {
            *durable = lsn;
            self.flush_requests.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
