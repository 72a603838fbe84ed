//! # Quarry - Git Object Database Access
//!
//! Quarry is the read side of a Git object database: windowed,
//! bounded-memory access to pack files, lockstep traversal of tree
//! objects, and a configurable walk over the commit graph.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use quarry::{MemoryObjectDatabase, ObjectId, TreeWalk, MODE_FILE};
//!
//! let odb = Arc::new(MemoryObjectDatabase::new());
//! let blob = ObjectId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")?;
//! let tree = ObjectId::from_hex("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")?;
//! odb.insert_blob(blob, b"hello");
//! odb.insert_tree(tree, &[(MODE_FILE, "greeting", blob)]);
//!
//! let mut walk = TreeWalk::new(odb);
//! walk.add_tree(tree)?;
//! while walk.next()? {
//!     println!("{} {}", walk.path_string(), walk.object_id(0));
//! }
//! # Ok::<(), quarry::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Quarry is layered the way the data flows:
//! - **Pack layer**: raw pack bytes served through a bounded pool of
//!   fixed-size windows ([`WindowCache`]), pinned by per-caller
//!   cursors.
//! - **Object layer**: inflated objects keyed by 20-byte content hash
//!   behind the [`ObjectDatabase`] trait.
//! - **Tree layer**: N-way merge-sorted iteration over tree objects
//!   ([`TreeWalk`]), with filters, recursion, and a directory-cache
//!   adapter.
//! - **Revision layer**: a generator pipeline over the commit graph
//!   ([`RevWalk`]) assembled from sorts and filters on first use.
//!
//! Walkers are single-threaded; the window cache and object database
//! are the shared, thread-safe pieces.

pub mod dircache;
pub mod error;
pub mod logging;
pub mod model;
pub mod odb;
pub mod pack;
pub mod revwalk;
pub mod tree;

// Re-export the main public API
pub use crate::error::{Error, Result};
pub use crate::model::{
    FileMode, ObjectId, ObjectKind, MODE_EXECUTABLE, MODE_FILE, MODE_GITLINK, MODE_MISSING,
    MODE_SYMLINK, MODE_TREE,
};
pub use crate::odb::{MemoryObjectDatabase, ObjectData, ObjectDatabase};
pub use crate::pack::{FilePackIo, Pack, PackIo, WindowCache, WindowCacheConfig, WindowCursor};
pub use crate::revwalk::{RevFilter, RevSort, RevWalk};
pub use crate::tree::{TreeFilter, TreeIter, TreeWalk, Verdict};
