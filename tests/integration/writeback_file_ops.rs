#![allow(missing_docs)]
#![cfg(unix)]

use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use tempfile::TempDir;
use wbcache::{
    CacheError, CacheOptions, HeapAllocator, PageBuffer, Result, WriteBackCache,
};

const PAGE_SIZE: u32 = 64;
const PAYLOAD: usize = 24;

fn options() -> CacheOptions {
    CacheOptions {
        page_size: PAGE_SIZE,
        background_flush: false,
        ..CacheOptions::default()
    }
}

fn open_cache(dir: &TempDir) -> Result<(WriteBackCache, Arc<HeapAllocator>)> {
    let alloc = Arc::new(HeapAllocator::new());
    let cache = WriteBackCache::open(dir.path(), options(), alloc.clone())?;
    Ok((cache, alloc))
}

fn page_with(cache: &WriteBackCache, marker: &[u8]) -> Result<PageBuffer> {
    let page = cache.new_page()?;
    page.write(PAYLOAD, marker)?;
    Ok(page)
}

fn marker_of(page: &PageBuffer, len: usize) -> Result<Vec<u8>> {
    page.read(PAYLOAD, len)
}

#[test]
fn close_and_reopen_keeps_id_and_content() -> Result<()> {
    let dir = TempDir::new()?;
    let (cache, _alloc) = open_cache(&dir)?;
    let file = cache.open_file("data.pcl")?;
    cache.put(file, 2, &page_with(&cache, b"kept")?)?;
    cache.close_file(file)?;

    assert!(!cache.is_open(file));
    assert_eq!(cache.dirty_pages(), 0);
    assert!(matches!(
        cache.put(file, 0, &page_with(&cache, b"late")?),
        Err(CacheError::FileClosed(id)) if id == file
    ));
    assert!(matches!(cache.load(file, 2), Err(CacheError::FileClosed(_))));

    assert_eq!(cache.open_file("data.pcl")?, file);
    assert!(cache.is_open(file));
    let page = cache.load(file, 2)?.expect("stored page");
    assert_eq!(marker_of(&page, 4)?, b"kept");
    assert!(cache.load(file, 1)?.is_none(), "gap before page 2 is unwritten");
    Ok(())
}

#[test]
fn delete_file_discards_pages_and_removes_file() -> Result<()> {
    let dir = TempDir::new()?;
    let (cache, alloc) = open_cache(&dir)?;
    let file = cache.open_file("gone.pcl")?;
    for idx in 0..4 {
        cache.put(file, idx, &page_with(&cache, b"x")?)?;
    }
    cache.flush_file(file)?;
    cache.put(file, 9, &page_with(&cache, b"y")?)?;

    cache.delete_file(file)?;
    assert!(!dir.path().join("gone.pcl").exists());
    assert!(!cache.exists("gone.pcl"));
    assert_eq!(cache.dirty_pages(), 0);
    assert_eq!(alloc.live_buffers(), 0);
    assert!(matches!(cache.get(file, 9), Err(CacheError::NoSuchFile(_))));
    assert!(matches!(
        cache.file_id("gone.pcl"),
        Err(CacheError::UnknownFileName(_))
    ));

    let again = cache.open_file("gone.pcl")?;
    assert_ne!(again, file, "ids are not reused");
    assert!(cache.load(again, 0)?.is_none());
    Ok(())
}

#[test]
fn failed_removal_still_discards_dirty_pages() -> Result<()> {
    let dir = TempDir::new()?;
    let (cache, alloc) = open_cache(&dir)?;
    let file = cache.open_file("stuck.pcl")?;
    cache.put(file, 0, &page_with(&cache, b"x")?)?;
    cache.put(file, 3, &page_with(&cache, b"y")?)?;
    // A directory in place of the backing file makes the unlink fail.
    let path = dir.path().join("stuck.pcl");
    std::fs::remove_file(&path)?;
    std::fs::create_dir(&path)?;

    assert!(matches!(cache.delete_file(file), Err(CacheError::Io(_))));
    assert_eq!(cache.dirty_pages(), 0);
    assert_eq!(alloc.live_buffers(), 0);
    assert!(matches!(cache.get(file, 0), Err(CacheError::NoSuchFile(_))));
    std::fs::remove_dir(&path)?;
    cache.close()?;
    Ok(())
}

#[test]
fn truncate_drops_dirty_and_stored_pages() -> Result<()> {
    let dir = TempDir::new()?;
    let (cache, _alloc) = open_cache(&dir)?;
    let file = cache.open_file("trunc.pcl")?;
    cache.put(file, 0, &page_with(&cache, b"a")?)?;
    cache.put(file, 1, &page_with(&cache, b"b")?)?;
    cache.flush()?;
    cache.put(file, 5, &page_with(&cache, b"c")?)?;
    assert_eq!(cache.filled_up_to(file)?, 6);

    cache.truncate_file(file)?;
    assert_eq!(cache.filled_up_to(file)?, 0);
    assert!(!cache.is_dirty(file, 5));
    assert!(cache.load(file, 0)?.is_none());
    assert_eq!(std::fs::metadata(dir.path().join("trunc.pcl"))?.len(), 0);

    cache.put(file, 0, &page_with(&cache, b"d")?)?;
    cache.flush()?;
    assert_eq!(marker_of(&cache.load(file, 0)?.expect("stored"), 1)?, b"d");
    Ok(())
}

#[test]
fn rename_keeps_id_and_dirty_pages() -> Result<()> {
    let dir = TempDir::new()?;
    let (cache, _alloc) = open_cache(&dir)?;
    let file = cache.open_file("old.pcl")?;
    cache.put(file, 0, &page_with(&cache, b"one")?)?;
    cache.flush()?;
    cache.put(file, 1, &page_with(&cache, b"two")?)?;

    cache.rename_file(file, "new.pcl")?;
    assert_eq!(cache.file_name(file)?, "new.pcl");
    assert!(!cache.exists("old.pcl"));
    assert!(cache.exists("new.pcl"));
    assert_eq!(cache.file_id("new.pcl")?, file);
    assert!(!dir.path().join("old.pcl").exists());

    cache.flush()?;
    assert_eq!(marker_of(&cache.load(file, 0)?.expect("stored"), 3)?, b"one");
    assert_eq!(marker_of(&cache.load(file, 1)?.expect("stored"), 3)?, b"two");

    let other = cache.open_file("other.pcl")?;
    assert!(matches!(
        cache.rename_file(other, "new.pcl"),
        Err(CacheError::Invalid(_))
    ));
    Ok(())
}

#[test]
fn damaged_frames_are_reported() -> Result<()> {
    let dir = TempDir::new()?;
    let (cache, _alloc) = open_cache(&dir)?;
    let file = cache.open_file("damaged.pcl")?;
    for idx in 0..4 {
        cache.put(file, idx, &page_with(&cache, b"intact")?)?;
    }
    cache.flush()?;

    let raw = OpenOptions::new()
        .write(true)
        .open(dir.path().join("damaged.pcl"))?;
    raw.write_at(b"rot", PAGE_SIZE as u64 + PAYLOAD as u64 + 2)?;
    raw.write_at(&[0xAB], 3 * PAGE_SIZE as u64)?;
    raw.sync_all()?;

    assert!(matches!(
        cache.load(file, 1),
        Err(CacheError::PageCorrupted { page_index: 1, reason: "frame checksum mismatch", .. })
    ));
    assert!(matches!(
        cache.load(file, 3),
        Err(CacheError::PageCorrupted { page_index: 3, reason: "invalid frame magic", .. })
    ));
    assert!(cache.load(file, 0)?.is_some());

    let issues = cache.check_stored_pages()?;
    let found: Vec<(u64, &str)> = issues.iter().map(|i| (i.page_index, i.reason)).collect();
    assert_eq!(
        found,
        vec![(1, "frame checksum mismatch"), (3, "invalid frame magic")]
    );
    assert!(issues.iter().all(|i| i.file_name == "damaged.pcl" && i.file_id == file));

    // A dirty copy shadows the damaged frame until it is rewritten.
    cache.put(file, 1, &page_with(&cache, b"fresh")?)?;
    assert!(cache.load(file, 1)?.is_some());
    cache.flush()?;
    assert_eq!(cache.check_stored_pages()?.len(), 1);
    Ok(())
}

#[test]
fn partial_trailing_frame_is_truncation() -> Result<()> {
    let dir = TempDir::new()?;
    let (cache, _alloc) = open_cache(&dir)?;
    let file = cache.open_file("short.pcl")?;
    cache.put(file, 0, &page_with(&cache, b"z")?)?;
    cache.flush()?;
    let raw = OpenOptions::new()
        .write(true)
        .open(dir.path().join("short.pcl"))?;
    raw.set_len(PAGE_SIZE as u64 + 10)?;

    assert!(matches!(
        cache.load(file, 1),
        Err(CacheError::PageCorrupted { page_index: 1, reason: "frame truncated", .. })
    ));
    let issues = cache.check_stored_pages()?;
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].page_index, 1);
    Ok(())
}

#[test]
fn delete_cache_removes_every_file() -> Result<()> {
    let dir = TempDir::new()?;
    let (cache, _alloc) = open_cache(&dir)?;
    for name in ["a.pcl", "b.pcl", "c.pcl"] {
        let file = cache.open_file(name)?;
        cache.put(file, 0, &page_with(&cache, name.as_bytes())?)?;
    }
    cache.delete()?;
    for name in ["a.pcl", "b.pcl", "c.pcl"] {
        assert!(!dir.path().join(name).exists(), "{name} still present");
    }
    assert!(matches!(cache.open_file("d.pcl"), Err(CacheError::Closed)));
    Ok(())
}

#[test]
fn opening_in_missing_directory_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let alloc = Arc::new(HeapAllocator::new());
    let cache = WriteBackCache::open(dir.path().join("absent"), options(), alloc)?;
    assert!(matches!(cache.open_file("x.pcl"), Err(CacheError::Io(_))));
    assert!(matches!(cache.open_file("../x.pcl"), Err(CacheError::Invalid(_))));
    Ok(())
}

#[test]
fn dropping_the_cache_persists_dirty_pages() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let (cache, _alloc) = open_cache(&dir)?;
        let file = cache.open_file("drop.pcl")?;
        cache.put(file, 4, &page_with(&cache, b"durable")?)?;
    }
    let (cache, _alloc) = open_cache(&dir)?;
    let file = cache.open_file("drop.pcl")?;
    assert_eq!(cache.filled_up_to(file)?, 5);
    let page = cache.load(file, 4)?.expect("persisted on drop");
    assert_eq!(marker_of(&page, 7)?, b"durable");
    Ok(())
}

#[test]
fn options_load_from_toml() -> Result<()> {
    let options = CacheOptions::from_toml_str(
        r#"
        page_size = 128
        sync_on_flush = false
        flush_interval_ms = 5
        flush_workers = 2
        background_flush = false
        "#,
    )?;
    assert_eq!(options.page_size, 128);
    assert_eq!(options.flush_workers, 2);

    let dir = TempDir::new()?;
    let cache = WriteBackCache::open(dir.path(), options, Arc::new(HeapAllocator::new()))?;
    assert_eq!(cache.page_size(), 128);
    let file = cache.open_file("toml.pcl")?;
    cache.put(file, 0, &cache.new_page()?)?;
    cache.flush()?;
    assert_eq!(std::fs::metadata(dir.path().join("toml.pcl"))?.len(), 128);

    let stats = cache.stats();
    assert_eq!(stats.puts, 1);
    assert_eq!(stats.pages_flushed, 1);
    assert_eq!(stats.open_files, 1);
    assert_eq!(stats.dirty_pages, 0);

    assert!(matches!(
        CacheOptions::from_toml_str("page_size = 10"),
        Err(CacheError::Invalid(_))
    ));
    Ok(())
}
