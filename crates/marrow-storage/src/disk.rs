//! Page-granular disk I/O.
//!
//! The disk manager is the lowest storage layer: it maps page identifiers
//! to fixed-size slots in a single data file and performs blocking reads
//! and writes against them. Retry and durability policy live here; the
//! buffer pool above treats both operations as infallible building blocks.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use marrow_common::types::PageId;
use parking_lot::Mutex;

use crate::error::{IoError, IoResult};

/// Blocking, page-granular I/O over a single data file.
///
/// Page `n` occupies bytes `[n * page_size, (n + 1) * page_size)` of the
/// file. Reads beyond the current end of file zero-fill the destination
/// buffer, so a page that was allocated but never written back reads as
/// all zeros.
///
/// The file handle is wrapped in a mutex; seek-then-read/write pairs are
/// atomic with respect to each other.
pub struct DiskManager {
    /// The underlying data file.
    file: Mutex<File>,
    /// The data file path.
    path: PathBuf,
    /// Size of each page in bytes.
    page_size: usize,
}

impl DiskManager {
    /// Opens (creating if necessary) the data file at `path`.
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> IoResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| IoError::from_io_with_path(e, &path))?;

        tracing::debug!(path = %path.display(), page_size, "opened data file");
        Ok(Self {
            file: Mutex::new(file),
            path,
            page_size,
        })
    }

    /// Returns the data file path.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the page size in bytes.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Reads one page into `buf`.
    ///
    /// `buf` must be exactly one page long. A read past the end of the
    /// file (or a partial tail read) zero-fills the remainder of `buf`.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> IoResult<()> {
        self.check_args(page_id, buf.len())?;

        let offset = page_id.as_u64() * self.page_size as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break, // end of file
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf[filled..].fill(0);

        Ok(())
    }

    /// Writes one page from `buf`.
    ///
    /// `buf` must be exactly one page long. The write extends the file as
    /// needed but does not fsync; call [`DiskManager::sync`] for that.
    pub fn write_page(&self, page_id: PageId, buf: &[u8]) -> IoResult<()> {
        self.check_args(page_id, buf.len())?;

        let offset = page_id.as_u64() * self.page_size as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;

        Ok(())
    }

    /// Flushes all written pages to stable storage.
    pub fn sync(&self) -> IoResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn check_args(&self, page_id: PageId, buf_len: usize) -> IoResult<()> {
        if !page_id.is_valid() {
            return Err(IoError::InvalidPageId);
        }
        if buf_len != self.page_size {
            return Err(IoError::buffer_size_mismatch(self.page_size, buf_len));
        }
        Ok(())
    }
}

impl std::fmt::Debug for DiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskManager")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .finish()
    }
}
