//! Byte windows and the cursors that pin them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use memmap2::Mmap;

use super::cache::WindowCache;
use super::io::Pack;
use crate::error::Result;

pub(crate) enum WindowBytes {
    Heap(Vec<u8>),
    Mapped(Mmap),
}

impl WindowBytes {
    fn as_slice(&self) -> &[u8] {
        match self {
            WindowBytes::Heap(buf) => buf.as_slice(),
            WindowBytes::Mapped(map) => map.as_ref(),
        }
    }
}

/// An immutable view of `[id * W, id * W + size)` of one pack, where
/// `W` is the cache's window size.
///
/// Windows are shared through `Arc`; the cache holds one reference and
/// each pinning cursor holds another, so eviction from the cache never
/// invalidates bytes a cursor is still reading.
pub struct ByteWindow {
    pack: Arc<Pack>,
    id: u64,
    start: u64,
    bytes: WindowBytes,
    last_accessed: AtomicU64,
}

impl ByteWindow {
    pub(crate) fn new(pack: Arc<Pack>, id: u64, start: u64, bytes: WindowBytes) -> Self {
        Self {
            pack,
            id,
            start,
            bytes,
            last_accessed: AtomicU64::new(0),
        }
    }

    /// The pack this window maps.
    pub fn pack(&self) -> &Arc<Pack> {
        &self.pack
    }

    /// Window index within the pack (`byte offset >> log2(W)`).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of bytes in the window.
    pub fn size(&self) -> usize {
        self.bytes.as_slice().len()
    }

    /// Whether `position` of `pack` falls inside this window.
    pub fn contains(&self, pack: &Arc<Pack>, position: u64) -> bool {
        Arc::ptr_eq(&self.pack, pack)
            && position >= self.start
            && position < self.start + self.size() as u64
    }

    /// Copies bytes starting at pack offset `position` into `dst`,
    /// returning how many were available in this window.
    pub fn copy(&self, position: u64, dst: &mut [u8]) -> usize {
        let data = self.bytes.as_slice();
        if position < self.start {
            return 0;
        }
        let off = (position - self.start) as usize;
        if off >= data.len() {
            return 0;
        }
        let n = dst.len().min(data.len() - off);
        dst[..n].copy_from_slice(&data[off..off + n]);
        n
    }

    pub(crate) fn stamp(&self, clock: u64) {
        self.last_accessed.store(clock, Ordering::Relaxed);
    }

    pub(crate) fn last_accessed(&self) -> u64 {
        self.last_accessed.load(Ordering::Relaxed)
    }

    pub(crate) fn sort_key(&self) -> (u32, u64) {
        (self.pack.hash(), self.id)
    }
}

/// A caller's pin over at most one window.
///
/// Cursor state is single-threaded; create one cursor per reading
/// caller. Dropping or [`release`](WindowCursor::release)-ing the
/// cursor lets the cache consider the window for eviction again.
#[derive(Default)]
pub struct WindowCursor {
    window: Option<Arc<ByteWindow>>,
}

impl WindowCursor {
    /// A cursor pinning nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently pinned window, if any.
    pub fn window(&self) -> Option<&Arc<ByteWindow>> {
        self.window.as_ref()
    }

    /// Drops the pin.
    pub fn release(&mut self) {
        self.window = None;
    }

    pub(crate) fn set_window(&mut self, window: Arc<ByteWindow>) {
        self.window = Some(window);
    }

    /// Ensures the cursor pins the window covering `position`.
    pub fn pin(&mut self, cache: &WindowCache, pack: &Arc<Pack>, position: u64) -> Result<()> {
        let already = self
            .window
            .as_ref()
            .is_some_and(|w| w.contains(pack, position));
        if already {
            return Ok(());
        }
        cache.get(self, pack, position)
    }

    /// Copies up to `dst.len()` bytes starting at `position`,
    /// crossing window boundaries as needed.
    ///
    /// Returns the number of bytes copied, which is short only when
    /// the pack ends first.
    pub fn copy(
        &mut self,
        cache: &WindowCache,
        pack: &Arc<Pack>,
        mut position: u64,
        dst: &mut [u8],
    ) -> Result<usize> {
        let mut copied = 0;
        while copied < dst.len() {
            if let Some(len) = pack.known_length() {
                if position >= len {
                    break;
                }
            }
            self.pin(cache, pack, position)?;
            let window = self.window.as_ref().expect("pin installs a window");
            let n = window.copy(position, &mut dst[copied..]);
            if n == 0 {
                break;
            }
            position += n as u64;
            copied += n;
        }
        Ok(copied)
    }
}
