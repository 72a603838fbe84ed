//! The bounded window pool.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::config::WindowCacheConfig;
use super::delta::DeltaBaseCache;
use super::io::Pack;
use super::window::{ByteWindow, WindowBytes, WindowCursor};
use crate::error::{Error, Result};
use crate::model::ObjectKind;

/// Advised-drop key: pack ordering hash plus raw byte offset. The
/// window id is recomputed at drain time against the live geometry.
type AdviseKey = (u32, u64);

struct CacheState {
    config: WindowCacheConfig,
    /// Dense array sorted by `(pack.hash, window id)`.
    windows: Vec<Arc<ByteWindow>>,
    open_bytes: u64,
}

/// Bounded pool of byte windows over pack files.
///
/// All index, open-count, and configuration mutation is serialized on
/// one internal mutex; reads through an already pinned window bypass
/// the cache entirely. A single cache is normally shared by every
/// walker over a repository; [`WindowCache::global`] offers a
/// process-wide instance as a compatibility shim for embedders that
/// expect singleton behavior.
pub struct WindowCache {
    state: Mutex<CacheState>,
    delta_bases: Mutex<DeltaBaseCache>,
    clock: AtomicU64,
    advise_tx: Sender<AdviseKey>,
    advise_rx: Receiver<AdviseKey>,
}

impl WindowCache {
    /// Creates a cache with the given geometry.
    pub fn new(config: WindowCacheConfig) -> Result<Self> {
        config.validate()?;
        let (advise_tx, advise_rx) = unbounded();
        Ok(Self {
            delta_bases: Mutex::new(DeltaBaseCache::new(config.delta_base_cache_limit)),
            state: Mutex::new(CacheState {
                config,
                windows: Vec::new(),
                open_bytes: 0,
            }),
            clock: AtomicU64::new(0),
            advise_tx,
            advise_rx,
        })
    }

    /// The process-wide cache, created on first use with default
    /// configuration. Prefer an explicit per-repository cache; this
    /// exists for embedders expecting singleton semantics.
    pub fn global() -> &'static WindowCache {
        static GLOBAL: OnceLock<WindowCache> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            WindowCache::new(WindowCacheConfig::default()).expect("default config is valid")
        })
    }

    /// Pins into `cursor` the window of `pack` containing `offset`,
    /// loading it on miss (which may evict other windows first).
    pub fn get(&self, cursor: &mut WindowCursor, pack: &Arc<Pack>, offset: u64) -> Result<()> {
        let mut state = self.state.lock();
        self.drain_advised(&mut state, Some(pack));

        let id = offset >> state.config.window_shift();
        if let Ok(idx) = search(&state.windows, (pack.hash(), id)) {
            let window = Arc::clone(&state.windows[idx]);
            window.stamp(self.tick());
            cursor.set_window(window);
            return Ok(());
        }

        let window = self.load(&mut state, pack, id)?;
        cursor.set_window(window);
        Ok(())
    }

    /// Drops all windows of `pack` and forces its logical close.
    pub fn purge(&self, pack: &Arc<Pack>) {
        let mut state = self.state.lock();
        let mut kept = Vec::with_capacity(state.windows.len());
        let mut dropped = 0u64;
        for window in state.windows.drain(..) {
            if Arc::ptr_eq(window.pack(), pack) {
                dropped += window.size() as u64;
            } else {
                kept.push(window);
            }
        }
        state.windows = kept;
        state.open_bytes -= dropped;
        pack.force_closed();
        self.delta_bases.lock().purge_pack(pack.hash());
    }

    /// Applies a new configuration immediately.
    ///
    /// A changed window size or mapping mode evicts every window; a
    /// lowered byte limit prunes down to the new budget on the spot.
    pub fn reconfigure(&self, config: WindowCacheConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.state.lock();
        let geometry_changed = config.packed_git_window_size
            != state.config.packed_git_window_size
            || config.packed_git_mmap != state.config.packed_git_mmap;
        let delta_limit = config.delta_base_cache_limit;
        state.config = config;

        if geometry_changed {
            info!(
                windows = state.windows.len(),
                "window geometry changed, evicting all windows"
            );
            while let Some(idx) = state.windows.len().checked_sub(1) {
                remove_window(&mut state, idx, None);
            }
        } else {
            evict_under_pressure(&mut state, 0, None);
        }

        self.delta_bases.lock().set_limit(delta_limit);
        Ok(())
    }

    /// Advises the cache that the window of `pack` covering `offset`
    /// may be reclaimed. Lock-free; the advice is honored during a
    /// later [`get`](WindowCache::get) unless a cursor still pins the
    /// window.
    pub fn advise_drop(&self, pack: &Pack, offset: u64) {
        let _ = self.advise_tx.send((pack.hash(), offset));
    }

    /// Number of currently resident windows.
    pub fn open_window_count(&self) -> usize {
        self.state.lock().windows.len()
    }

    /// Bytes currently resident across all windows.
    pub fn open_byte_count(&self) -> u64 {
        self.state.lock().open_bytes
    }

    /// A copy of the active configuration.
    pub fn config(&self) -> WindowCacheConfig {
        self.state.lock().config.clone()
    }

    /// Looks up an inflated delta base cached for `(pack, offset)`.
    pub fn delta_base(&self, pack: &Pack, offset: u64) -> Option<(ObjectKind, Arc<[u8]>)> {
        self.delta_bases.lock().get(pack.hash(), offset)
    }

    /// Caches an inflated delta base for `(pack, offset)`.
    pub fn store_delta_base(&self, pack: &Pack, offset: u64, kind: ObjectKind, data: Arc<[u8]>) {
        self.delta_bases.lock().store(pack.hash(), offset, kind, data);
    }

    /// Resident bytes of the delta-base cache.
    pub fn delta_base_bytes(&self) -> usize {
        self.delta_bases.lock().resident_bytes()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn drain_advised(&self, state: &mut CacheState, exclude: Option<&Arc<Pack>>) {
        let shift = state.config.window_shift();
        while let Ok((pack_hash, offset)) = self.advise_rx.try_recv() {
            let id = offset >> shift;
            if let Ok(idx) = search(&state.windows, (pack_hash, id)) {
                // A strongly referenced window is pinned by a cursor
                // and cannot be cleared.
                if Arc::strong_count(&state.windows[idx]) == 1 {
                    remove_window(state, idx, exclude);
                }
            }
        }
    }

    fn load(
        &self,
        state: &mut CacheState,
        pack: &Arc<Pack>,
        id: u64,
    ) -> Result<Arc<ByteWindow>> {
        let freshly_opened = pack.open_count() == 0;
        let length = if freshly_opened {
            match pack.cache_open() {
                Ok(len) => len,
                Err(err) => {
                    warn!(pack = pack.hash(), "pack open failed: {err}");
                    return Err(err);
                }
            }
        } else {
            pack.known_length()
                .ok_or(Error::IllegalState("open pack lost its length"))?
        };

        // cache_open may itself have populated the target window.
        if let Ok(idx) = search(&state.windows, (pack.hash(), id)) {
            let window = Arc::clone(&state.windows[idx]);
            window.stamp(self.tick());
            return Ok(window);
        }

        let shift = state.config.window_shift();
        let window_size = u64::from(state.config.packed_git_window_size);
        let start = id << shift;
        if start >= length {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("offset {start} past end of pack ({length} bytes)"),
            )));
        }
        let size = window_size.min(length - start) as usize;

        evict_under_pressure(state, size as u64, Some(pack));

        let loaded = if state.config.packed_git_mmap {
            pack.io().mmap(start, size).map(WindowBytes::Mapped)
        } else {
            let mut buf = vec![0u8; size];
            match pack.io().read_at(start, &mut buf) {
                Ok(n) if n == size => Ok(WindowBytes::Heap(buf)),
                Ok(n) => Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("short read at {start}: wanted {size}, got {n}"),
                ))),
                Err(err) => Err(err),
            }
        };
        let bytes = match loaded {
            Ok(bytes) => bytes,
            Err(err) => {
                if freshly_opened && pack.open_count() == 0 {
                    pack.force_closed();
                }
                return Err(err);
            }
        };

        pack.add_open();
        let window = Arc::new(ByteWindow::new(Arc::clone(pack), id, start, bytes));
        window.stamp(self.tick());
        match search(&state.windows, window.sort_key()) {
            Ok(_) => unreachable!("window installed twice"),
            Err(insert_at) => state.windows.insert(insert_at, Arc::clone(&window)),
        }
        state.open_bytes += size as u64;
        Ok(window)
    }
}

/// Binary search over the dense sorted window array. `Err` carries the
/// insertion point, matching `slice::binary_search` conventions.
fn search(windows: &[Arc<ByteWindow>], key: (u32, u64)) -> std::result::Result<usize, usize> {
    windows.binary_search_by_key(&key, |w| w.sort_key())
}

/// Evicts least-recently-used unpinned windows until `incoming` more
/// bytes fit under the budget and the window count stays below
/// capacity.
fn evict_under_pressure(state: &mut CacheState, incoming: u64, exclude: Option<&Arc<Pack>>) {
    let capacity = state.config.window_capacity();
    let limit = state.config.packed_git_limit;
    let adding = usize::from(incoming > 0);
    loop {
        let over_count = state.windows.len() + adding > capacity;
        let over_bytes = state.open_bytes + incoming > limit;
        if !over_count && !over_bytes {
            return;
        }
        // Linear scan: the working set is small, typically a few
        // hundred windows.
        let victim = state
            .windows
            .iter()
            .enumerate()
            .filter(|(_, w)| Arc::strong_count(w) == 1)
            .min_by_key(|(_, w)| w.last_accessed())
            .map(|(idx, _)| idx);
        match victim {
            Some(idx) => {
                debug!(
                    pack = state.windows[idx].pack().hash(),
                    id = state.windows[idx].id(),
                    "evicting window under pressure"
                );
                remove_window(state, idx, exclude);
            }
            // Every window is pinned; the budget is best-effort until
            // cursors release.
            None => return,
        }
    }
}

fn remove_window(state: &mut CacheState, idx: usize, exclude: Option<&Arc<Pack>>) {
    let window = state.windows.remove(idx);
    state.open_bytes -= window.size() as u64;
    let pack = window.pack();
    if pack.remove_open() {
        let keep_open = exclude.is_some_and(|p| Arc::ptr_eq(p, pack));
        if !keep_open {
            pack.io().cache_close();
        }
    }
}
