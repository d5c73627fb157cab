#![allow(missing_docs)]

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tempfile::TempDir;
use wbcache::{
    admin::verify_file,
    primitives::{
        io::{FileIo, StdFileIo},
        pager::REPEATED_FAILURE_THRESHOLD,
    },
    CacheError, CacheOptions, FlushObserver, HeapAllocator, Lsn, LsnCell, PageFlushError,
    PageKey, Result, WalSource, WriteBackCache,
};

const PAGE_SIZE: u32 = 32;

fn options(background: bool) -> CacheOptions {
    CacheOptions {
        page_size: PAGE_SIZE,
        background_flush: background,
        flush_interval_ms: 5,
        ..CacheOptions::default()
    }
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(raw)
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

/// File wrapper that fails writes to chosen pages and, optionally, syncs.
struct FaultyIo {
    inner: StdFileIo,
    failing_pages: Mutex<HashSet<u64>>,
    fail_sync: AtomicBool,
}

impl FaultyIo {
    fn open(dir: &TempDir, name: &str) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            inner: StdFileIo::open(dir.path().join(name))?,
            failing_pages: Mutex::new(HashSet::new()),
            fail_sync: AtomicBool::new(false),
        }))
    }

    fn fail_pages(&self, pages: &[u64]) {
        self.failing_pages.lock().extend(pages.iter().copied());
    }

    fn heal(&self) {
        self.failing_pages.lock().clear();
        self.fail_sync.store(false, Ordering::SeqCst);
    }
}

fn injected(what: &str) -> CacheError {
    CacheError::Io(io::Error::new(io::ErrorKind::Other, format!("injected {what} failure")))
}

impl FileIo for FaultyIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        self.inner.read_at(off, dst)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        if self.failing_pages.lock().contains(&(off / PAGE_SIZE as u64)) {
            return Err(injected("write"));
        }
        self.inner.write_at(off, src)
    }

    fn sync_all(&self) -> Result<()> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(injected("sync"));
        }
        self.inner.sync_all()
    }

    fn len(&self) -> Result<u64> {
        self.inner.len()
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.inner.truncate(len)
    }
}

#[derive(Default)]
struct RecordingObserver {
    reports: Mutex<Vec<(PageKey, u32)>>,
}

impl RecordingObserver {
    fn max_streak(&self, key: PageKey) -> u32 {
        self.reports
            .lock()
            .iter()
            .filter(|(reported, _)| *reported == key)
            .map(|(_, streak)| *streak)
            .max()
            .unwrap_or(0)
    }
}

impl FlushObserver for RecordingObserver {
    fn on_page_flush_failed(&self, failure: &PageFlushError, consecutive: u32) {
        self.reports.lock().push((failure.key, consecutive));
    }
}

#[test]
fn page_five_is_framed_at_its_offset() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let cache = WriteBackCache::open(dir.path(), options(false), alloc)?;
    let file = cache.open_file("five.pcl")?;
    let page = cache.new_page()?;
    page.write(24, &[0xAA; 8])?;
    cache.put(file, 5, &page)?;
    cache.flush()?;
    assert_eq!(cache.dirty_pages(), 0);

    let raw = std::fs::read(dir.path().join("five.pcl"))?;
    assert_eq!(raw.len(), 6 * 32);
    assert!(raw[..160].iter().all(|&b| b == 0), "pages 0-4 stay unwritten");
    let frame = &raw[160..192];
    assert_eq!(le_u64(&frame[0..8]), 0xFACB_03FE);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&frame[12..32]);
    assert_eq!(le_u32(&frame[8..12]), hasher.finalize());
    assert_eq!(le_u32(&frame[12..16]), 0);
    assert_eq!(le_u64(&frame[16..24]), 0);
    assert_eq!(&frame[24..32], &[0xAA; 8]);

    let loaded = cache.load(file, 5)?.expect("frame on disk");
    assert_eq!(loaded.to_vec()?, frame.to_vec());
    assert!(cache.load(file, 4)?.is_none());
    assert!(cache.load(file, 6)?.is_none());
    cache.close()?;

    let report = verify_file(dir.path().join("five.pcl"), PAGE_SIZE).expect("verify");
    assert!(report.success);
    assert_eq!(report.counts.valid_pages, 1);
    assert_eq!(report.counts.unwritten_pages, 5);
    Ok(())
}

#[test]
fn frames_carry_the_wal_position_of_their_last_put() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let wal = Arc::new(LsnCell::new(Lsn::new(3, 4096)));
    let cache = WriteBackCache::open_with_wal(dir.path(), options(false), alloc, wal.clone())?;
    let file = cache.open_file("wal.pcl")?;
    let page = cache.new_page()?;
    cache.put(file, 0, &page)?;
    cache.flush()?;
    assert_eq!(wal.durable_lsn(), Lsn::new(3, 4096));

    let raw = std::fs::read(dir.path().join("wal.pcl"))?;
    assert_eq!(le_u32(&raw[12..16]), 3);
    assert_eq!(le_u64(&raw[16..24]), 4096);
    Ok(())
}

struct BrokenWal;

impl WalSource for BrokenWal {
    fn current_lsn(&self) -> Lsn {
        Lsn::new(1, 1)
    }

    fn durable_lsn(&self) -> Lsn {
        Lsn::ZERO
    }

    fn flush_up_to(&self, _lsn: Lsn) -> Result<()> {
        Err(injected("wal"))
    }
}

#[test]
fn pages_wait_for_wal_durability() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let cache =
        WriteBackCache::open_with_wal(dir.path(), options(false), alloc, Arc::new(BrokenWal))?;
    let file = cache.open_file("nowal.pcl")?;
    cache.put(file, 0, &cache.new_page()?)?;
    cache.put(file, 1, &cache.new_page()?)?;
    let failure = match cache.flush() {
        Err(CacheError::Flush(failure)) => failure,
        other => panic!("expected flush failure, got {other:?}"),
    };
    assert_eq!(failure.failures.len(), 2);
    assert_eq!(cache.dirty_pages(), 2);
    assert_eq!(std::fs::metadata(dir.path().join("nowal.pcl"))?.len(), 0);
    assert!(matches!(cache.close(), Err(CacheError::Flush(_))));
    Ok(())
}

#[test]
fn pages_persist_without_explicit_flush() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let cache = WriteBackCache::open(dir.path(), options(true), alloc)?;
    let file = cache.open_file("eventual.pcl")?;
    for idx in 0..20u64 {
        let page = cache.new_page()?;
        page.write(24, &idx.to_le_bytes())?;
        cache.put(file, idx, &page)?;
    }
    assert!(
        wait_until(Duration::from_secs(5), || cache.dirty_pages() == 0),
        "background worker should drain the dirty table"
    );
    assert!(cache.stats().background_passes > 0);
    assert_eq!(cache.stats().flush_passes, 0);
    assert!(cache.check_stored_pages()?.is_empty());
    for idx in 0..20u64 {
        let stored = cache.load(file, idx)?.expect("page on disk");
        assert_eq!(stored.read(24, 8)?, idx.to_le_bytes(), "page {idx}");
    }
    let report = verify_file(dir.path().join("eventual.pcl"), PAGE_SIZE).expect("verify");
    assert_eq!(report.counts.valid_pages, 20);
    Ok(())
}

#[test]
fn failed_final_sync_keeps_file_open_for_retry() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let io = FaultyIo::open(&dir, "unsynced.pcl")?;
    let cache = WriteBackCache::open(
        dir.path(),
        CacheOptions {
            sync_on_flush: false,
            ..options(false)
        },
        alloc,
    )?;
    let file = cache.open_file_with_io("unsynced.pcl", io.clone())?;
    cache.put(file, 0, &cache.new_page()?)?;
    io.fail_sync.store(true, Ordering::SeqCst);

    assert!(matches!(cache.close(), Err(CacheError::Io(_))));
    assert!(cache.is_open(file), "handle must survive a failed final sync");
    assert!(matches!(cache.close(), Err(CacheError::Io(_))));
    assert!(cache.is_open(file));

    io.heal();
    cache.close()?;
    assert!(!cache.is_open(file));
    Ok(())
}

#[test]
fn trigger_flush_wakes_worker_early() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let slow = CacheOptions {
        flush_interval_ms: 60_000,
        ..options(true)
    };
    let cache = WriteBackCache::open(dir.path(), slow, alloc)?;
    let file = cache.open_file("trigger.pcl")?;
    cache.put(file, 0, &cache.new_page()?)?;
    cache.trigger_flush()?;
    assert!(wait_until(Duration::from_secs(5), || cache.dirty_pages() == 0));
    Ok(())
}

#[test]
fn failed_pages_are_listed_and_stay_dirty() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let cache = WriteBackCache::open(dir.path(), options(false), alloc)?;
    let io = FaultyIo::open(&dir, "faulty.pcl")?;
    let file = cache.open_file_with_io("faulty.pcl", io.clone())?;
    for idx in 0..6u64 {
        let page = cache.new_page()?;
        page.write(24, &[idx as u8; 8])?;
        cache.put(file, idx, &page)?;
    }
    io.fail_pages(&[2, 4]);

    let failure = match cache.flush() {
        Err(CacheError::Flush(failure)) => failure,
        other => panic!("expected flush failure, got {other:?}"),
    };
    let failed: Vec<u64> = failure.keys().map(|key| key.page_index).collect();
    assert_eq!(failed, vec![2, 4]);
    assert!(failure.failures[0].reason.contains("injected write failure"));
    assert_eq!(cache.dirty_pages(), 2);
    assert!(cache.is_dirty(file, 2) && cache.is_dirty(file, 4));
    for idx in [0u64, 1, 3, 5] {
        assert!(!cache.is_dirty(file, idx));
        let stored = cache.load(file, idx)?.expect("persisted");
        assert_eq!(stored.read(24, 8)?, vec![idx as u8; 8]);
    }
    assert_eq!(cache.stats().flush_failures, 2);

    io.heal();
    cache.flush()?;
    assert_eq!(cache.dirty_pages(), 0);
    Ok(())
}

#[test]
fn failed_sync_keeps_written_pages_dirty() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let cache = WriteBackCache::open(dir.path(), options(false), alloc)?;
    let io = FaultyIo::open(&dir, "nosync.pcl")?;
    let file = cache.open_file_with_io("nosync.pcl", io.clone())?;
    cache.put(file, 0, &cache.new_page()?)?;
    cache.put(file, 1, &cache.new_page()?)?;
    io.fail_sync.store(true, Ordering::SeqCst);
    assert!(matches!(cache.flush(), Err(CacheError::Flush(f)) if f.failures.len() == 2));
    assert_eq!(cache.dirty_pages(), 2);

    io.heal();
    cache.flush()?;
    assert_eq!(cache.dirty_pages(), 0);
    Ok(())
}

#[test]
fn repeated_background_failures_reach_the_observer() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let observer = Arc::new(RecordingObserver::default());
    let cache =
        WriteBackCache::open(dir.path(), options(true), alloc)?.with_observer(observer.clone());
    let io = FaultyIo::open(&dir, "bgfail.pcl")?;
    io.fail_pages(&[1]);
    let file = cache.open_file_with_io("bgfail.pcl", io.clone())?;
    for idx in 0..4u64 {
        cache.put(file, idx, &cache.new_page()?)?;
    }
    let stuck = PageKey::new(file, 1);
    assert!(wait_until(Duration::from_secs(5), || {
        observer.max_streak(stuck) >= REPEATED_FAILURE_THRESHOLD
    }));
    assert_eq!(cache.dirty_pages(), 1, "other pages keep flushing");
    assert!(cache.is_dirty(file, 1));

    io.heal();
    assert!(wait_until(Duration::from_secs(5), || cache.dirty_pages() == 0));
    cache.close()?;
    Ok(())
}

#[test]
fn close_reports_failures_and_can_be_retried() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let cache = WriteBackCache::open(dir.path(), options(false), alloc.clone())?;
    let io = FaultyIo::open(&dir, "retry.pcl")?;
    let file = cache.open_file_with_io("retry.pcl", io.clone())?;
    cache.put(file, 0, &cache.new_page()?)?;
    io.fail_pages(&[0]);

    assert!(matches!(cache.close(), Err(CacheError::Flush(_))));
    assert!(cache.is_open(file));
    assert!(matches!(cache.flush(), Err(CacheError::Closed)));

    io.heal();
    cache.close()?;
    assert!(!cache.is_open(file));
    assert_eq!(alloc.live_buffers(), 0);
    Ok(())
}

#[test]
fn parallel_flush_workers_cover_every_file() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let parallel = CacheOptions {
        flush_workers: 4,
        ..options(false)
    };
    let cache = WriteBackCache::open(dir.path(), parallel, alloc)?;
    let files: Vec<_> = (0..6)
        .map(|n| cache.open_file(&format!("part{n}.pcl")))
        .collect::<Result<_>>()?;
    for &file in &files {
        for idx in 0..10u64 {
            cache.put(file, idx, &cache.new_page()?)?;
        }
    }
    cache.flush()?;
    assert_eq!(cache.dirty_pages(), 0);
    assert_eq!(cache.stats().pages_flushed, 60);
    for &file in &files {
        assert_eq!(cache.filled_up_to(file)?, 10);
    }
    Ok(())
}
