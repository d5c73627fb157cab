#![forbid(unsafe_code)]

use std::{
    fs::{File, OpenOptions},
    io::{self, ErrorKind},
    path::Path,
    sync::Arc,
};

use tracing::{trace, warn};

use crate::types::{CacheError, Result};

/// Positioned I/O on one backing file. Page `i` of a file lives at
/// `i * page_size`; implementations never move a shared cursor.
pub trait FileIo: Send + Sync + 'static {
    /// Fills `dst` from `off`; reading past the end is an error.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes all of `src` at `off`, extending the file when needed.
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    /// Makes written data and metadata durable.
    fn sync_all(&self) -> Result<()>;
    /// Current length in bytes.
    fn len(&self) -> Result<u64>;
    /// Shrinks or extends the file to `len` bytes.
    fn truncate(&self, len: u64) -> Result<()>;
}

/// How backing files are opened.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OpenMode {
    /// Bypass the OS page cache where the platform and filesystem allow it.
    pub direct: bool,
}

fn read_write_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);
    options
}

#[cfg(target_os = "linux")]
fn open_direct(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    read_write_options().custom_flags(libc::O_DIRECT).open(path)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn open_direct(_path: &Path) -> io::Result<File> {
    Err(io::Error::from_raw_os_error(libc::EINVAL))
}

#[cfg(not(unix))]
fn open_direct(_path: &Path) -> io::Result<File> {
    Err(io::Error::new(ErrorKind::Unsupported, "direct I/O unsupported"))
}

fn direct_unsupported(err: &io::Error) -> bool {
    #[cfg(unix)]
    let einval = err.raw_os_error() == Some(libc::EINVAL);
    #[cfg(not(unix))]
    let einval = false;
    einval || err.kind() == ErrorKind::Unsupported
}

#[cfg(unix)]
fn pread(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, dst, off)
}

#[cfg(unix)]
fn pwrite(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, src, off)
}

#[cfg(windows)]
fn pread(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, dst, off)
}

#[cfg(windows)]
fn pwrite(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, src, off)
}

/// [`FileIo`] over a std [`File`] shared behind an `Arc`.
#[derive(Clone)]
pub struct StdFileIo {
    inner: Arc<File>,
}

impl StdFileIo {
    /// Wraps an already opened file.
    pub fn new(file: File) -> Self {
        Self {
            inner: Arc::new(file),
        }
    }

    /// Opens `path` for reading and writing, creating it if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenMode::default())
    }

    /// Like [`StdFileIo::open`]. With `mode.direct` the file is opened with
    /// `O_DIRECT`; filesystems that refuse it get a buffered handle instead.
    pub fn open_with(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        if mode.direct {
            match open_direct(path) {
                Ok(file) => return Ok(Self::new(file)),
                Err(err) if direct_unsupported(&err) => {
                    warn!(path = %path.display(), "wbcache.io.direct_unsupported");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Self::new(read_write_options().open(path)?))
    }

    fn read_exact_at(&self, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
        while !dst.is_empty() {
            let read = pread(&self.inner, dst, off)?;
            if read == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "read reached end of file",
                ));
            }
            dst = &mut std::mem::take(&mut dst)[read..];
            off += read as u64;
        }
        Ok(())
    }

    fn write_all_at(&self, mut off: u64, mut src: &[u8]) -> io::Result<()> {
        while !src.is_empty() {
            let written = pwrite(&self.inner, src, off)?;
            if written == 0 {
                return Err(io::Error::new(ErrorKind::WriteZero, "write stalled"));
            }
            src = &src[written..];
            off += written as u64;
        }
        Ok(())
    }
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        self.read_exact_at(off, dst).map_err(CacheError::from)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        trace!(off, len = src.len(), "wbcache.io.write_at");
        self.write_all_at(off, src).map_err(CacheError::from)
    }

    fn sync_all(&self) -> Result<()> {
        self.inner.sync_all().map_err(|err| {
            warn!(error = %err, "wbcache.io.sync_failed");
            CacheError::from(err)
        })
    }

    fn len(&self) -> Result<u64> {
        Ok(self.inner.metadata()?.len())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.inner.set_len(len).map_err(CacheError::from)
    }
}
