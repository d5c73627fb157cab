//! Background flush worker.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, error, info, warn};

use super::cache::{CacheShared, PassOutcome};
use crate::types::{CacheError, FileId, PageKey, Result};

/// Consecutive failures of one page after which every further failure is
/// logged at error level.
pub const REPEATED_FAILURE_THRESHOLD: u32 = 3;

const THREAD_NAME: &str = "wbcache-flush";

pub(crate) enum FlushMessage {
    Trigger,
    Shutdown,
}

/// Handle to the thread running periodic flush passes.
pub(crate) struct FlushWorker {
    sender: Sender<FlushMessage>,
    thread: Option<thread::JoinHandle<()>>,
}

impl FlushWorker {
    pub(crate) fn spawn(shared: Arc<CacheShared>, interval: Duration) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || flush_loop(&shared, &receiver, interval))?;
        Ok(Self {
            sender,
            thread: Some(thread),
        })
    }

    pub(crate) fn trigger(&self) -> Result<()> {
        self.sender
            .send(FlushMessage::Trigger)
            .map_err(|_| CacheError::Invalid("flush worker channel closed"))
    }

    /// Stops the worker after its current pass and waits for it to exit.
    pub(crate) fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.sender.send(FlushMessage::Shutdown);
        if thread.join().is_err() {
            error!("wbcache.flush_worker.panicked");
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn flush_loop(shared: &CacheShared, receiver: &Receiver<FlushMessage>, interval: Duration) {
    info!(interval_ms = interval.as_millis() as u64, "wbcache.flush_worker.start");
    let mut state = LoopState::default();
    loop {
        match receiver.recv_timeout(interval) {
            Ok(FlushMessage::Trigger) | Err(mpsc::RecvTimeoutError::Timeout) => {
                let outcome = shared.background_pass(&mut state.cursor);
                state.record(shared, outcome);
            }
            Ok(FlushMessage::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("wbcache.flush_worker.stop");
}

struct LoopState {
    cursor: PageKey,
    consecutive: FxHashMap<PageKey, u32>,
}

impl Default for LoopState {
    fn default() -> Self {
        Self {
            cursor: PageKey::new(FileId(0), 0),
            consecutive: FxHashMap::default(),
        }
    }
}

impl LoopState {
    /// Tracks per-page failure streaks and reports the failures.
    fn record(&mut self, shared: &CacheShared, outcome: PassOutcome) {
        if outcome.flushed > 0 {
            debug!(flushed = outcome.flushed, "wbcache.flush_worker.pass");
        }
        let observer = shared.observer();
        let mut failed = FxHashSet::default();
        for failure in &outcome.failures {
            failed.insert(failure.key);
            let streak = self.consecutive.entry(failure.key).or_insert(0);
            *streak += 1;
            if *streak >= REPEATED_FAILURE_THRESHOLD {
                error!(
                    key = %failure.key,
                    consecutive = *streak,
                    reason = %failure.reason,
                    "wbcache.flush_worker.page_failing_repeatedly"
                );
            } else {
                warn!(
                    key = %failure.key,
                    consecutive = *streak,
                    reason = %failure.reason,
                    "wbcache.flush_worker.page_failed"
                );
            }
            observer.on_page_flush_failed(failure, *streak);
        }
        self.consecutive
            .retain(|key, _| failed.contains(key) || shared.is_dirty(*key));
    }
}
