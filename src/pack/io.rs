//! Pack descriptors and their backing I/O.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use memmap2::{Mmap, MmapOptions};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Raw access to one pack's bytes.
///
/// The window cache opens and closes the backing storage around window
/// residency: `cache_open` is invoked when the first window of a pack
/// is loaded and `cache_close` once the last one is gone. Both must be
/// idempotent.
pub trait PackIo: Send + Sync {
    /// Total length of the pack in bytes.
    fn length(&self) -> Result<u64>;

    /// Makes the backing storage ready for reads.
    fn cache_open(&self) -> Result<()>;

    /// Releases the backing storage.
    fn cache_close(&self);

    /// Reads up to `dst.len()` bytes starting at `offset`.
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<usize>;

    /// Memory-maps `len` bytes starting at `offset`.
    ///
    /// `offset` is always a multiple of the window size, which the
    /// cache guarantees to be page aligned.
    fn mmap(&self, offset: u64, len: usize) -> Result<Mmap>;
}

static NEXT_PACK_SEQ: AtomicU32 = AtomicU32::new(1);

/// One pack known to the window cache.
///
/// Carries the I/O provider, a stable ordering hash, and the count of
/// live windows referencing the pack. The count is mutated only by the
/// cache, under its lock; it is atomic so stats can read it lock-free.
pub struct Pack {
    io: Box<dyn PackIo>,
    hash: u32,
    open_count: AtomicI32,
    length: AtomicU64,
    length_known: AtomicU32,
}

impl Pack {
    /// Wraps an I/O provider in a shareable descriptor.
    pub fn new(io: Box<dyn PackIo>) -> Arc<Pack> {
        // Multiplying a unique counter by an odd constant is a
        // bijection on u32, so hashes stay distinct per descriptor.
        let seq = NEXT_PACK_SEQ.fetch_add(1, Ordering::Relaxed);
        Arc::new(Pack {
            io,
            hash: seq.wrapping_mul(0x9E37_79B9),
            open_count: AtomicI32::new(0),
            length: AtomicU64::new(0),
            length_known: AtomicU32::new(0),
        })
    }

    /// Stable ordering hash.
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Number of live windows over this pack.
    pub fn open_count(&self) -> i32 {
        self.open_count.load(Ordering::Relaxed)
    }

    /// Pack length, if a window load has already established it.
    pub fn known_length(&self) -> Option<u64> {
        if self.length_known.load(Ordering::Acquire) != 0 {
            Some(self.length.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    pub(crate) fn io(&self) -> &dyn PackIo {
        self.io.as_ref()
    }

    /// Opens the backing storage and records the pack length.
    ///
    /// On any failure the open count is restored to zero so a later
    /// retry starts from a clean slate.
    pub(crate) fn cache_open(&self) -> Result<u64> {
        let open = (|| {
            self.io.cache_open()?;
            self.io.length()
        })();
        match open {
            Ok(len) => {
                self.length.store(len, Ordering::Relaxed);
                self.length_known.store(1, Ordering::Release);
                Ok(len)
            }
            Err(err) => {
                self.open_count.store(0, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    pub(crate) fn add_open(&self) {
        self.open_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops one window's reference; returns true when the pack just
    /// became logically closed.
    pub(crate) fn remove_open(&self) -> bool {
        self.open_count.fetch_sub(1, Ordering::Relaxed) == 1
    }

    pub(crate) fn force_closed(&self) {
        self.open_count.store(0, Ordering::Relaxed);
        self.io.cache_close();
    }
}

impl std::fmt::Debug for Pack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pack")
            .field("hash", &self.hash)
            .field("open_count", &self.open_count())
            .finish()
    }
}

/// A pack stored in a plain file.
///
/// The file handle is opened by `cache_open` and dropped by
/// `cache_close`; `length` works either way, off filesystem metadata.
pub struct FilePackIo {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FilePackIo {
    /// Describes the pack at `path` without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }
}

impl PackIo for FilePackIo {
    fn length(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn cache_open(&self) -> Result<()> {
        let mut guard = self.file.lock();
        if guard.is_none() {
            *guard = Some(File::open(&self.path)?);
        }
        Ok(())
    }

    fn cache_close(&self) {
        *self.file.lock() = None;
    }

    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<usize> {
        let mut guard = self.file.lock();
        let file = guard
            .as_mut()
            .ok_or(Error::IllegalState("pack read before cache_open"))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut copied = 0;
        while copied < dst.len() {
            let n = file.read(&mut dst[copied..])?;
            if n == 0 {
                break;
            }
            copied += n;
        }
        Ok(copied)
    }

    fn mmap(&self, offset: u64, len: usize) -> Result<Mmap> {
        let guard = self.file.lock();
        let file = guard
            .as_ref()
            .ok_or(Error::IllegalState("pack mapped before cache_open"))?;
        // SAFETY: the mapping is read-only and quarry never mutates
        // pack files it has handed to a cache; concurrent external
        // truncation is the same hazard every file-backed map carries.
        let map = unsafe { MmapOptions::new().offset(offset).len(len).map(file)? };
        Ok(map)
    }
}
