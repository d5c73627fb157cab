//! Write-back page cache.
//!
//! Producers hand finished pages to [`WriteBackCache::put`]; the pages stay
//! in the dirty table until a flush pass frames them (magic, CRC-32, WAL
//! stamp) and writes them to their slot in the backing file. Passes run on
//! the background worker at a fixed interval or synchronously through
//! [`WriteBackCache::flush`].
//!
//! Lock order: file flush lock, then page flush lock, then file handle, then
//! dirty table. A page flush lock is never held while waiting for a file
//! flush lock.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::buffer::PageBuffer;
use super::dirty::{DirtyEntry, DirtyPageTable};
use super::flusher::FlushWorker;
use super::frame::{self, FrameStatus};
use super::options::CacheOptions;
use super::registry::{FileEntry, FileRegistry};
use super::stats::{CacheCounters, CacheStats, FlushObserver, NoopObserver};
use crate::primitives::alloc::PageAllocator;
use crate::primitives::bytes::AlignedBuf;
use crate::primitives::concurrency::{FlushGuard, FlushLockTable, DEFAULT_LOCK_SHARDS};
use crate::primitives::io::{FileIo, OpenMode};
use crate::primitives::wal::WalSource;
use crate::types::{CacheError, FileId, FlushFailure, Lsn, PageFlushError, PageKey, Result};

/// A stored page whose frame failed verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageIntegrityIssue {
    /// File holding the page.
    pub file_id: FileId,
    /// Name of that file at scan time.
    pub file_name: String,
    /// Index of the damaged page.
    pub page_index: u64,
    /// Which check failed.
    pub reason: &'static str,
}

type PageBatch = Vec<(PageKey, DirtyEntry)>;

/// Result of flushing a set of pages.
#[derive(Debug, Default)]
pub(crate) struct PassOutcome {
    pub flushed: u64,
    pub failures: Vec<PageFlushError>,
}

impl PassOutcome {
    fn merge(&mut self, other: PassOutcome) {
        self.flushed += other.flushed;
        self.failures.extend(other.failures);
    }

    fn into_result(mut self) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        self.failures.sort_by_key(|failure| failure.key);
        Err(CacheError::Flush(FlushFailure {
            failures: self.failures,
        }))
    }
}

fn fail_all(keys: impl IntoIterator<Item = PageKey>, err: &CacheError) -> Vec<PageFlushError> {
    let reason = err.to_string();
    keys.into_iter()
        .map(|key| PageFlushError {
            key,
            reason: reason.clone(),
        })
        .collect()
}

fn group_by_file(pages: PageBatch) -> Vec<(FileId, PageBatch)> {
    let mut groups: BTreeMap<FileId, PageBatch> = BTreeMap::new();
    for (key, entry) in pages {
        groups.entry(key.file_id).or_default().push((key, entry));
    }
    for pages in groups.values_mut() {
        pages.sort_by_key(|(key, _)| *key);
    }
    groups.into_iter().collect()
}

fn successor(key: PageKey) -> PageKey {
    match key.page_index.checked_add(1) {
        Some(next) => PageKey::new(key.file_id, next),
        None => PageKey::new(FileId(key.file_id.0.wrapping_add(1)), 0),
    }
}

/// State shared between the cache handle and its flush worker.
pub(crate) struct CacheShared {
    options: CacheOptions,
    page_size: usize,
    allocator: Arc<dyn PageAllocator>,
    wal: Option<Arc<dyn WalSource>>,
    registry: FileRegistry,
    dirty: DirtyPageTable,
    locks: FlushLockTable,
    counters: CacheCounters,
    observer: RwLock<Arc<dyn FlushObserver>>,
    closed: AtomicBool,
}

impl CacheShared {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    fn page_offset(&self, page_index: u64) -> Result<u64> {
        page_index
            .checked_mul(self.page_size as u64)
            .ok_or(CacheError::Invalid("page offset overflow"))
    }

    pub(crate) fn observer(&self) -> Arc<dyn FlushObserver> {
        self.observer.read().clone()
    }

    pub(crate) fn is_dirty(&self, key: PageKey) -> bool {
        self.dirty.contains(key)
    }

    fn install(&self, guard: &FlushGuard<'_>, buffer: &PageBuffer) -> Result<()> {
        if buffer.len() != self.page_size {
            return Err(CacheError::Invalid("page buffer size does not match page size"));
        }
        let key = guard.key();
        self.page_offset(key.page_index)?;
        let entry = self.registry.entry(key.file_id)?;
        let lsn = self
            .wal
            .as_ref()
            .map_or(Lsn::ZERO, |wal| wal.current_lsn());
        entry.while_open(|_| {
            self.dirty.put(key, buffer.retain(), lsn);
        })?;
        CacheCounters::bump(&self.counters.puts, 1);
        Ok(())
    }

    fn make_wal_durable(&self, lsn: Lsn) -> Result<()> {
        let Some(wal) = &self.wal else {
            return Ok(());
        };
        if lsn > wal.durable_lsn() {
            wal.flush_up_to(lsn)?;
        }
        Ok(())
    }

    fn write_frame(
        &self,
        io: &dyn FileIo,
        key: PageKey,
        page: &DirtyEntry,
        frame: &mut AlignedBuf,
        durable_to: &mut Lsn,
    ) -> Result<()> {
        if page.lsn > *durable_to {
            self.make_wal_durable(page.lsn)?;
            *durable_to = page.lsn;
        }
        let bytes = frame.as_mut_slice();
        page.buffer.read_into(0, bytes)?;
        frame::encode_into(bytes, page.lsn)?;
        io.write_at(self.page_offset(key.page_index)?, bytes)
    }

    /// Persists `pages` of one file. The caller holds the file's flush lock.
    fn flush_pages(&self, entry: &FileEntry, pages: PageBatch) -> PassOutcome {
        let mut outcome = PassOutcome::default();
        if pages.is_empty() {
            return outcome;
        }
        let io = match entry.io() {
            Ok(io) => io,
            Err(_) => {
                debug!(
                    file_id = entry.id().0,
                    pages = pages.len(),
                    "wbcache.flush.file_closed"
                );
                return outcome;
            }
        };

        let batch_lsn = pages
            .iter()
            .map(|(_, page)| page.lsn)
            .max()
            .unwrap_or(Lsn::ZERO);
        if let Err(err) = self.make_wal_durable(batch_lsn) {
            outcome.failures = fail_all(pages.iter().map(|(key, _)| *key), &err);
            CacheCounters::bump(&self.counters.flush_failures, outcome.failures.len() as u64);
            return outcome;
        }

        let mut durable_to = batch_lsn;
        let mut frame = AlignedBuf::zeroed(self.page_size);
        let mut written = Vec::with_capacity(pages.len());
        for (key, _) in pages {
            let guard = self.locks.acquire(key);
            let Some(current) = self.dirty.peek(key) else {
                continue;
            };
            match self.write_frame(io.as_ref(), key, &current, &mut frame, &mut durable_to) {
                Ok(()) => written.push((key, current.version)),
                Err(err) => {
                    debug!(%key, error = %err, "wbcache.flush.page_failed");
                    outcome.failures.push(PageFlushError {
                        key,
                        reason: err.to_string(),
                    });
                }
            }
            drop(guard);
        }

        if self.options.sync_on_flush && !written.is_empty() {
            if let Err(err) = io.sync_all() {
                outcome
                    .failures
                    .extend(fail_all(written.drain(..).map(|(key, _)| key), &err));
            }
        }
        for (key, version) in written {
            if self.dirty.remove_if_unchanged(key, version) {
                outcome.flushed += 1;
            }
        }
        CacheCounters::bump(&self.counters.pages_flushed, outcome.flushed);
        CacheCounters::bump(&self.counters.flush_failures, outcome.failures.len() as u64);
        outcome
    }

    fn flush_group(&self, file_id: FileId, pages: PageBatch) -> PassOutcome {
        let Ok(entry) = self.registry.entry(file_id) else {
            // Deleted while the pass was being planned; its pages are discarded.
            return PassOutcome::default();
        };
        let _pass = entry.lock_for_flush();
        let outcome = self.flush_pages(&entry, pages);
        debug!(
            file_id = file_id.0,
            flushed = outcome.flushed,
            failed = outcome.failures.len(),
            "wbcache.flush.file_done"
        );
        outcome
    }

    fn flush_groups(&self, groups: Vec<(FileId, PageBatch)>) -> PassOutcome {
        let workers = self.options.flush_workers.min(groups.len());
        if workers <= 1 {
            let mut outcome = PassOutcome::default();
            for (file_id, pages) in groups {
                outcome.merge(self.flush_group(file_id, pages));
            }
            return outcome;
        }

        let mut buckets: Vec<Vec<(FileId, PageBatch)>> = (0..workers).map(|_| Vec::new()).collect();
        for (idx, group) in groups.into_iter().enumerate() {
            buckets[idx % workers].push(group);
        }
        thread::scope(|scope| {
            let handles: Vec<_> = buckets
                .into_iter()
                .map(|bucket| {
                    scope.spawn(move || {
                        let mut outcome = PassOutcome::default();
                        for (file_id, pages) in bucket {
                            outcome.merge(self.flush_group(file_id, pages));
                        }
                        outcome
                    })
                })
                .collect();
            let mut total = PassOutcome::default();
            for handle in handles {
                match handle.join() {
                    Ok(outcome) => total.merge(outcome),
                    Err(_) => error!("wbcache.flush.worker_panicked"),
                }
            }
            total
        })
    }

    fn flush_all(&self) -> PassOutcome {
        CacheCounters::bump(&self.counters.flush_passes, 1);
        self.flush_groups(group_by_file(self.dirty.drain_snapshot()))
    }

    /// One bounded background pass starting at `cursor`; advances the cursor
    /// past the last page it reached.
    pub(crate) fn background_pass(&self, cursor: &mut PageKey) -> PassOutcome {
        let pages = self
            .dirty
            .snapshot_from(*cursor, self.options.flush_batch_pages);
        let Some((last, _)) = pages.last() else {
            return PassOutcome::default();
        };
        *cursor = successor(*last);
        CacheCounters::bump(&self.counters.background_passes, 1);
        self.flush_groups(group_by_file(pages))
    }

    /// Flushes the file and releases its handle once nothing of it is dirty.
    fn close_entry(&self, entry: &FileEntry) -> Result<()> {
        let _pass = entry.lock_for_flush();
        loop {
            if !entry.is_open() {
                return Ok(());
            }
            let pages = self.dirty.file_snapshot(entry.id());
            if !pages.is_empty() {
                self.flush_pages(entry, pages).into_result()?;
            }
            if entry.release_handle_if(|| self.dirty.file_len(entry.id()) == 0)? {
                return Ok(());
            }
        }
    }
}

/// Write-back cache of fixed-size pages over a directory of backing files.
pub struct WriteBackCache {
    shared: Arc<CacheShared>,
    worker: Mutex<Option<FlushWorker>>,
}

impl WriteBackCache {
    /// Opens a cache whose backing files live in `dir`. Pages are stamped
    /// with [`Lsn::ZERO`].
    pub fn open(
        dir: impl AsRef<Path>,
        options: CacheOptions,
        allocator: Arc<dyn PageAllocator>,
    ) -> Result<Self> {
        Self::open_inner(dir.as_ref(), options, allocator, None)
    }

    /// Opens a cache that stamps pages with the position of `wal` and makes
    /// the log durable before writing pages that depend on it.
    pub fn open_with_wal(
        dir: impl AsRef<Path>,
        options: CacheOptions,
        allocator: Arc<dyn PageAllocator>,
        wal: Arc<dyn WalSource>,
    ) -> Result<Self> {
        Self::open_inner(dir.as_ref(), options, allocator, Some(wal))
    }

    fn open_inner(
        dir: &Path,
        options: CacheOptions,
        allocator: Arc<dyn PageAllocator>,
        wal: Option<Arc<dyn WalSource>>,
    ) -> Result<Self> {
        options.validate()?;
        let mode = OpenMode {
            direct: options.direct_io,
        };
        let background = options.background_flush;
        let interval = options.flush_interval();
        let shared = Arc::new(CacheShared {
            page_size: options.page_len(),
            options,
            allocator,
            wal,
            registry: FileRegistry::new(dir, mode),
            dirty: DirtyPageTable::new(),
            locks: FlushLockTable::new(DEFAULT_LOCK_SHARDS),
            counters: CacheCounters::default(),
            observer: RwLock::new(Arc::new(NoopObserver)),
            closed: AtomicBool::new(false),
        });
        let worker = if background {
            Some(FlushWorker::spawn(Arc::clone(&shared), interval)?)
        } else {
            None
        };
        info!(
            dir = %dir.display(),
            page_size = shared.page_size,
            background,
            "wbcache.open"
        );
        Ok(Self {
            shared,
            worker: Mutex::new(worker),
        })
    }

    /// Installs the receiver of background flush failure reports.
    pub fn with_observer(self, observer: Arc<dyn FlushObserver>) -> Self {
        *self.shared.observer.write() = observer;
        self
    }

    /// Page size in bytes, frame header included.
    pub fn page_size(&self) -> usize {
        self.shared.page_size
    }

    /// Options the cache was opened with.
    pub fn options(&self) -> &CacheOptions {
        &self.shared.options
    }

    /// Allocator backing every page buffer.
    pub fn allocator(&self) -> Arc<dyn PageAllocator> {
        Arc::clone(&self.shared.allocator)
    }

    /// Allocates a zeroed page-sized buffer.
    pub fn new_page(&self) -> Result<PageBuffer> {
        PageBuffer::allocate(Arc::clone(&self.shared.allocator), self.shared.page_size)
    }

    /// Opens (or creates) a backing file and returns its id. Opening a
    /// closed file reuses its id.
    pub fn open_file(&self, name: &str) -> Result<FileId> {
        self.shared.ensure_open()?;
        self.shared.registry.open(name)
    }

    /// Like [`WriteBackCache::open_file`] with a caller-supplied file handle.
    pub fn open_file_with_io(&self, name: &str, io: Arc<dyn FileIo>) -> Result<FileId> {
        self.shared.ensure_open()?;
        self.shared.registry.open_with_io(name, io)
    }

    /// Id of a registered file name.
    pub fn file_id(&self, name: &str) -> Result<FileId> {
        self.shared
            .registry
            .resolve(name)
            .ok_or_else(|| CacheError::UnknownFileName(name.to_owned()))
    }

    /// Registered name of `file_id`.
    pub fn file_name(&self, file_id: FileId) -> Result<String> {
        Ok(self.shared.registry.entry(file_id)?.name())
    }

    /// Returns true if `name` is registered or exists in the cache directory.
    pub fn exists(&self, name: &str) -> bool {
        self.shared.registry.exists(name)
    }

    /// Returns true if `file_id` is registered and has an open handle.
    pub fn is_open(&self, file_id: FileId) -> bool {
        self.shared
            .registry
            .entry(file_id)
            .is_ok_and(|entry| entry.is_open())
    }

    /// Flushes the file's dirty pages and releases its handle. The name keeps
    /// its id.
    pub fn close_file(&self, file_id: FileId) -> Result<()> {
        self.shared.ensure_open()?;
        let entry = self.shared.registry.entry(file_id)?;
        CacheCounters::bump(&self.shared.counters.flush_passes, 1);
        self.shared.close_entry(&entry)
    }

    /// Discards the file's dirty pages, closes it and removes it from disk.
    pub fn delete_file(&self, file_id: FileId) -> Result<()> {
        self.shared.ensure_open()?;
        let removed = self.shared.registry.delete(file_id);
        let discarded = self.shared.dirty.discard_file(file_id);
        removed?;
        info!(file_id = file_id.0, discarded, "wbcache.delete_file");
        Ok(())
    }

    /// Discards the file's dirty pages and shrinks it to zero length.
    pub fn truncate_file(&self, file_id: FileId) -> Result<()> {
        self.shared.ensure_open()?;
        let entry = self.shared.registry.entry(file_id)?;
        let _pass = entry.lock_for_flush();
        let discarded = entry.while_open(|io| {
            let discarded = self.shared.dirty.discard_file(file_id);
            io.truncate(0).map(|()| discarded)
        })??;
        info!(file_id = file_id.0, discarded, "wbcache.truncate_file");
        Ok(())
    }

    /// Renames the backing file; the id is unchanged.
    pub fn rename_file(&self, file_id: FileId, new_name: &str) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared.registry.rename(file_id, new_name)
    }

    /// Number of pages the file spans, counting dirty pages past the end of
    /// the backing file.
    pub fn filled_up_to(&self, file_id: FileId) -> Result<u64> {
        let entry = self.shared.registry.entry(file_id)?;
        let on_disk = entry
            .io()?
            .len()?
            .div_ceil(self.shared.page_size as u64);
        let dirty = self
            .shared
            .dirty
            .max_page_index(file_id)
            .map_or(0, |idx| idx + 1);
        Ok(on_disk.max(dirty))
    }

    /// Acquires the flush lock of one page. While held, no flush writes the
    /// page and no `put` replaces it.
    ///
    /// The lock is not reentrant: `put`, `load` and flushes of this page
    /// block while the calling thread holds the guard.
    pub fn acquire_flush_lock(&self, file_id: FileId, page_index: u64) -> Result<FlushGuard<'_>> {
        self.shared.ensure_open()?;
        self.shared.registry.entry(file_id)?;
        Ok(self.shared.locks.acquire(PageKey::new(file_id, page_index)))
    }

    /// Records `buffer` as the newest content of the page. The cache keeps
    /// its own reference; the caller's handle stays valid.
    pub fn put(&self, file_id: FileId, page_index: u64, buffer: &PageBuffer) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared.registry.entry(file_id)?;
        let guard = self.shared.locks.acquire(PageKey::new(file_id, page_index));
        self.shared.install(&guard, buffer)
    }

    /// Like [`WriteBackCache::put`] for a caller that already holds the
    /// page's flush lock.
    pub fn put_locked(&self, guard: &FlushGuard<'_>, buffer: &PageBuffer) -> Result<()> {
        self.shared.ensure_open()?;
        if !guard.belongs_to(&self.shared.locks) {
            return Err(CacheError::Invalid("flush guard belongs to another cache"));
        }
        self.shared.install(guard, buffer)
    }

    /// Returns the dirty content of the page, or `None` if it is not dirty.
    pub fn get(&self, file_id: FileId, page_index: u64) -> Result<Option<PageBuffer>> {
        self.shared.ensure_open()?;
        self.shared.registry.entry(file_id)?;
        let found = self
            .shared
            .dirty
            .peek(PageKey::new(file_id, page_index))
            .map(|entry| entry.buffer);
        let counter = if found.is_some() {
            &self.shared.counters.get_hits
        } else {
            &self.shared.counters.get_misses
        };
        CacheCounters::bump(counter, 1);
        Ok(found)
    }

    /// Returns the newest content of the page: the dirty entry if any,
    /// otherwise the verified frame stored on disk (header included).
    /// Unwritten pages yield `None`.
    pub fn load(&self, file_id: FileId, page_index: u64) -> Result<Option<PageBuffer>> {
        self.shared.ensure_open()?;
        let entry = self.shared.registry.entry(file_id)?;
        let key = PageKey::new(file_id, page_index);
        let _guard = self.shared.locks.acquire(key);
        if let Some(dirty) = self.shared.dirty.peek(key) {
            return Ok(Some(dirty.buffer));
        }
        let io = entry.io()?;
        let offset = self.shared.page_offset(page_index)?;
        let len = io.len()?;
        if offset >= len {
            return Ok(None);
        }
        if len - offset < self.shared.page_size as u64 {
            return Err(CacheError::Corruption("frame truncated").at_page(key));
        }
        let mut frame = AlignedBuf::zeroed(self.shared.page_size);
        io.read_at(offset, frame.as_mut_slice())?;
        if frame::is_unwritten(frame.as_slice()) {
            return Ok(None);
        }
        frame::decode(frame.as_slice()).map_err(|err| err.at_page(key))?;
        PageBuffer::from_bytes(Arc::clone(&self.shared.allocator), frame.as_slice()).map(Some)
    }

    /// Persists every dirty page. Pages that fail stay dirty and are listed
    /// in the returned [`CacheError::Flush`].
    pub fn flush(&self) -> Result<()> {
        self.shared.ensure_open()?;
        let result = self.shared.flush_all().into_result();
        if let Err(CacheError::Flush(failure)) = &result {
            warn!(pages = failure.failures.len(), "wbcache.flush.failed");
        }
        result
    }

    /// Persists the dirty pages of one file.
    pub fn flush_file(&self, file_id: FileId) -> Result<()> {
        self.shared.ensure_open()?;
        let entry = self.shared.registry.entry(file_id)?;
        CacheCounters::bump(&self.shared.counters.flush_passes, 1);
        let _pass = entry.lock_for_flush();
        let pages = self.shared.dirty.file_snapshot(file_id);
        self.shared.flush_pages(&entry, pages).into_result()
    }

    /// Wakes the background worker. Does nothing when background flushing
    /// is disabled.
    pub fn trigger_flush(&self) -> Result<()> {
        self.shared.ensure_open()?;
        match self.worker.lock().as_ref() {
            Some(worker) => worker.trigger(),
            None => Ok(()),
        }
    }

    /// Stops the background worker, flushes every page and releases every
    /// file. On a flush failure the affected files stay open and `close` can
    /// be retried. Afterwards every other operation fails with
    /// [`CacheError::Closed`].
    pub fn close(&self) -> Result<()> {
        let first = !self.shared.closed.swap(true, Ordering::AcqRel);
        if let Some(worker) = self.worker.lock().take() {
            worker.shutdown();
        }
        let mut failure = FlushFailure::default();
        for entry in self.shared.registry.entries() {
            match self.shared.close_entry(&entry) {
                Ok(()) => {}
                Err(CacheError::Flush(partial)) => failure.failures.extend(partial.failures),
                Err(err) => return Err(err),
            }
        }
        if !failure.is_empty() {
            warn!(pages = failure.failures.len(), "wbcache.close.flush_failed");
            return Err(CacheError::Flush(failure));
        }
        if first {
            info!(dir = %self.shared.registry.dir().display(), "wbcache.close");
        }
        Ok(())
    }

    /// Closes the cache and removes every backing file.
    pub fn delete(&self) -> Result<()> {
        self.close()?;
        for entry in self.shared.registry.entries() {
            self.shared.registry.delete(entry.id())?;
            self.shared.dirty.discard_file(entry.id());
        }
        info!(dir = %self.shared.registry.dir().display(), "wbcache.delete");
        Ok(())
    }

    /// Reads every stored frame of every open file and reports the ones
    /// failing magic or checksum verification.
    pub fn check_stored_pages(&self) -> Result<Vec<PageIntegrityIssue>> {
        self.shared.ensure_open()?;
        let page_size = self.shared.page_size as u64;
        let mut frame = AlignedBuf::zeroed(self.shared.page_size);
        let mut issues = Vec::new();
        for entry in self.shared.registry.entries() {
            let Ok(io) = entry.io() else {
                continue;
            };
            let len = io.len()?;
            let full_pages = len / page_size;
            for page_index in 0..full_pages {
                let key = PageKey::new(entry.id(), page_index);
                let status = {
                    let _guard = self.shared.locks.acquire(key);
                    io.read_at(page_index * page_size, frame.as_mut_slice())?;
                    frame::inspect(frame.as_slice())
                };
                if let FrameStatus::Corrupt(reason) = status {
                    issues.push(PageIntegrityIssue {
                        file_id: entry.id(),
                        file_name: entry.name(),
                        page_index,
                        reason,
                    });
                }
            }
            if len % page_size != 0 {
                issues.push(PageIntegrityIssue {
                    file_id: entry.id(),
                    file_name: entry.name(),
                    page_index: full_pages,
                    reason: "frame truncated",
                });
            }
        }
        if !issues.is_empty() {
            warn!(issues = issues.len(), "wbcache.check.issues_found");
        }
        Ok(issues)
    }

    /// Number of pages waiting to be persisted.
    pub fn dirty_pages(&self) -> usize {
        self.shared.dirty.len()
    }

    /// Returns true if the page waits to be persisted.
    pub fn is_dirty(&self, file_id: FileId, page_index: u64) -> bool {
        self.shared.is_dirty(PageKey::new(file_id, page_index))
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let open_files = self
            .shared
            .registry
            .entries()
            .iter()
            .filter(|entry| entry.is_open())
            .count();
        self.shared
            .counters
            .snapshot(self.shared.dirty.len(), open_files)
    }
}

impl Drop for WriteBackCache {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(error = %err, "wbcache.drop.close_failed");
        }
    }
}
