//! Window cache configuration.

use crate::error::{Error, Result};

/// Default resident byte budget (10 MiB).
pub const DEFAULT_PACKED_GIT_LIMIT: u64 = 10 * 1024 * 1024;
/// Default bytes per window (8 KiB).
pub const DEFAULT_PACKED_GIT_WINDOW_SIZE: u32 = 8 * 1024;
/// Default delta base cache budget (10 MiB).
pub const DEFAULT_DELTA_BASE_CACHE_LIMIT: usize = 10 * 1024 * 1024;

/// Smallest permitted window size.
const MIN_WINDOW_SIZE: u32 = 4096;

/// Tunables recognized by the window cache.
///
/// Changes are applied immediately by
/// [`WindowCache::reconfigure`](super::WindowCache::reconfigure): a
/// lowered byte limit prunes to fit on the spot, while a changed
/// window size or mapping mode evicts every resident window, since
/// none of them is reusable under the new geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCacheConfig {
    /// Maximum bytes of pack data held resident across all windows.
    pub packed_git_limit: u64,
    /// Bytes per window. Must be a power of two, at least 4096.
    pub packed_git_window_size: u32,
    /// Memory-map windows instead of reading into heap buffers.
    pub packed_git_mmap: bool,
    /// Byte budget of the inflated delta-base cache.
    pub delta_base_cache_limit: usize,
}

impl Default for WindowCacheConfig {
    fn default() -> Self {
        Self {
            packed_git_limit: DEFAULT_PACKED_GIT_LIMIT,
            packed_git_window_size: DEFAULT_PACKED_GIT_WINDOW_SIZE,
            packed_git_mmap: false,
            delta_base_cache_limit: DEFAULT_DELTA_BASE_CACHE_LIMIT,
        }
    }
}

impl WindowCacheConfig {
    /// Checks every field, rejecting bad values with
    /// [`Error::InvalidConfig`] before they reach the cache.
    pub fn validate(&self) -> Result<()> {
        let ws = self.packed_git_window_size;
        if ws < MIN_WINDOW_SIZE || !ws.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "packed_git_window_size must be a power of two >= {MIN_WINDOW_SIZE}, got {ws}"
            )));
        }
        if self.packed_git_limit < u64::from(ws) {
            return Err(Error::InvalidConfig(format!(
                "packed_git_limit {} is smaller than one window ({ws})",
                self.packed_git_limit
            )));
        }
        Ok(())
    }

    /// log2 of the window size, used to split offsets into window ids.
    pub(crate) fn window_shift(&self) -> u32 {
        self.packed_git_window_size.trailing_zeros()
    }

    /// Maximum number of simultaneously resident windows.
    pub(crate) fn window_capacity(&self) -> usize {
        (self.packed_git_limit / u64::from(self.packed_git_window_size)) as usize
    }
}
