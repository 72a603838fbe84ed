//! Windowed random-access reads over pack files.
//!
//! Pack files are consumed through fixed-size byte windows pooled in a
//! [`WindowCache`]. The cache holds at most a configured number of
//! resident bytes, evicting least-recently-used windows under pressure
//! and draining an advise-drop queue that external memory pressure can
//! feed. Callers read through a [`WindowCursor`], whose pin keeps the
//! current window's bytes valid regardless of eviction.

mod cache;
mod config;
mod delta;
mod io;
mod window;

pub use cache::WindowCache;
pub use config::WindowCacheConfig;
pub use delta::DeltaBaseCache;
pub use io::{FilePackIo, Pack, PackIo};
pub use window::{ByteWindow, WindowCursor};
