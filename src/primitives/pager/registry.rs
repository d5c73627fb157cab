//! Name → id registry of backing files.
//!
//! Entries live in a densely indexed arena; a [`FileId`] is the index of its
//! slot. Slots of deleted files stay empty so ids are never reused while the
//! registry is alive.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

use crate::primitives::io::{FileIo, OpenMode, StdFileIo};
use crate::types::{CacheError, FileId, Result};

/// One registered backing file.
pub struct FileEntry {
    id: FileId,
    location: Mutex<FileLocation>,
    handle: Mutex<Option<Arc<dyn FileIo>>>,
    flush_lock: Mutex<()>,
}

#[derive(Clone, Debug)]
struct FileLocation {
    name: String,
    path: PathBuf,
}

impl FileEntry {
    fn new(id: FileId, name: String, path: PathBuf, io: Arc<dyn FileIo>) -> Self {
        Self {
            id,
            location: Mutex::new(FileLocation { name, path }),
            handle: Mutex::new(Some(io)),
            flush_lock: Mutex::new(()),
        }
    }

    /// Numeric id of the file.
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Registered name.
    pub fn name(&self) -> String {
        self.location.lock().name.clone()
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.location.lock().path.clone()
    }

    /// Returns true while the backing file has an open handle.
    pub fn is_open(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Open handle of the backing file.
    pub fn io(&self) -> Result<Arc<dyn FileIo>> {
        self.handle
            .lock()
            .clone()
            .ok_or(CacheError::FileClosed(self.id))
    }

    /// Serializes flush passes (and close/delete) against this file.
    pub fn lock_for_flush(&self) -> MutexGuard<'_, ()> {
        self.flush_lock.lock()
    }

    /// Runs `f` with the open handle. A concurrent release waits until `f`
    /// returns, so pages installed by `f` are visible to the releasing side.
    pub(crate) fn while_open<R>(&self, f: impl FnOnce(&Arc<dyn FileIo>) -> R) -> Result<R> {
        let handle = self.handle.lock();
        match handle.as_ref() {
            Some(io) => Ok(f(io)),
            None => Err(CacheError::FileClosed(self.id)),
        }
    }

    /// Releases the handle if `idle()` holds, evaluated while no
    /// [`FileEntry::while_open`] call is running. Returns false when the file
    /// was not idle; an already closed file counts as released. A failed
    /// final sync leaves the handle open.
    pub(crate) fn release_handle_if(&self, idle: impl FnOnce() -> bool) -> Result<bool> {
        let mut handle = self.handle.lock();
        let Some(io) = handle.as_ref() else {
            return Ok(true);
        };
        if !idle() {
            return Ok(false);
        }
        // The handle stays in place until the final sync succeeds.
        io.sync_all()?;
        handle.take();
        info!(file_id = self.id.0, "wbcache.registry.close");
        Ok(true)
    }

    fn release_handle(&self) -> Option<Arc<dyn FileIo>> {
        self.handle.lock().take()
    }
}

/// Arena of [`FileEntry`] plus the name index.
pub struct FileRegistry {
    dir: PathBuf,
    mode: OpenMode,
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    files: Vec<Option<Arc<FileEntry>>>,
    by_name: HashMap<String, FileId>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(CacheError::Invalid("file name must not be empty"));
    }
    if name.contains(['/', '\\']) {
        return Err(CacheError::Invalid("file name must not contain path separators"));
    }
    Ok(())
}

impl FileRegistry {
    /// Creates a registry whose files live directly under `dir`.
    pub fn new(dir: impl AsRef<Path>, mode: OpenMode) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            mode,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Directory holding the backing files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Opens `name`, creating the backing file if absent. Repeated opens
    /// return the same id; a closed file is reopened under its old id.
    pub fn open(&self, name: &str) -> Result<FileId> {
        self.open_inner(name, None)
    }

    /// Like [`FileRegistry::open`] but uses `io` as the file handle for a new
    /// or closed entry.
    pub fn open_with_io(&self, name: &str, io: Arc<dyn FileIo>) -> Result<FileId> {
        self.open_inner(name, Some(io))
    }

    fn open_inner(&self, name: &str, io: Option<Arc<dyn FileIo>>) -> Result<FileId> {
        validate_name(name)?;
        let mut inner = self.inner.write();
        if let Some(&id) = inner.by_name.get(name) {
            let entry = inner.files[id.0 as usize]
                .clone()
                .ok_or(CacheError::NoSuchFile(id))?;
            let mut handle = entry.handle.lock();
            if handle.is_none() {
                let io = match io {
                    Some(io) => io,
                    None => Arc::new(StdFileIo::open_with(entry.path(), self.mode)?),
                };
                *handle = Some(io);
                info!(file_id = id.0, name, "wbcache.registry.reopen");
            }
            return Ok(id);
        }
        let path = self.dir.join(name);
        let io = match io {
            Some(io) => io,
            None => Arc::new(StdFileIo::open_with(&path, self.mode)?),
        };
        let raw = u32::try_from(inner.files.len())
            .map_err(|_| CacheError::Invalid("file id space exhausted"))?;
        let id = FileId(raw);
        inner
            .files
            .push(Some(Arc::new(FileEntry::new(id, name.to_owned(), path, io))));
        inner.by_name.insert(name.to_owned(), id);
        info!(file_id = id.0, name, "wbcache.registry.open");
        Ok(id)
    }

    /// Looks up a live entry.
    pub fn entry(&self, id: FileId) -> Result<Arc<FileEntry>> {
        self.inner
            .read()
            .files
            .get(id.0 as usize)
            .and_then(|slot| slot.clone())
            .ok_or(CacheError::NoSuchFile(id))
    }

    /// Looks up a live entry whose handle is open.
    pub fn open_entry(&self, id: FileId) -> Result<Arc<FileEntry>> {
        let entry = self.entry(id)?;
        if !entry.is_open() {
            return Err(CacheError::FileClosed(id));
        }
        Ok(entry)
    }

    /// Resolves a registered name.
    pub fn resolve(&self, name: &str) -> Option<FileId> {
        self.inner.read().by_name.get(name).copied()
    }

    /// Returns true if `name` is registered or its backing file exists.
    pub fn exists(&self, name: &str) -> bool {
        if self.resolve(name).is_some() {
            return true;
        }
        validate_name(name).is_ok() && self.dir.join(name).exists()
    }

    /// Every live entry in id order.
    pub fn entries(&self) -> Vec<Arc<FileEntry>> {
        self.inner.read().files.iter().flatten().cloned().collect()
    }

    /// Drops the mapping of `id`, closes its handle and removes the backing
    /// file.
    pub fn delete(&self, id: FileId) -> Result<()> {
        let entry = {
            let mut inner = self.inner.write();
            let entry = inner
                .files
                .get_mut(id.0 as usize)
                .and_then(Option::take)
                .ok_or(CacheError::NoSuchFile(id))?;
            inner.by_name.remove(&entry.name());
            entry
        };
        let _flush = entry.lock_for_flush();
        drop(entry.release_handle());
        match fs::remove_file(entry.path()) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(CacheError::from(err)),
        }
        info!(file_id = id.0, "wbcache.registry.delete");
        Ok(())
    }

    /// Renames the backing file and mapping of `id`; the id is unchanged.
    pub fn rename(&self, id: FileId, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(new_name) {
            return Err(CacheError::Invalid("target file name already registered"));
        }
        let entry = inner
            .files
            .get(id.0 as usize)
            .and_then(|slot| slot.clone())
            .ok_or(CacheError::NoSuchFile(id))?;
        let new_path = self.dir.join(new_name);
        let mut location = entry.location.lock();
        fs::rename(&location.path, &new_path)?;
        let old_name = std::mem::replace(&mut location.name, new_name.to_owned());
        location.path = new_path;
        inner.by_name.remove(&old_name);
        inner.by_name.insert(new_name.to_owned(), id);
        debug!(file_id = id.0, from = %old_name, to = new_name, "wbcache.registry.rename");
        Ok(())
    }
}
