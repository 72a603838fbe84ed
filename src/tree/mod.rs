//! Synchronized traversal of tree objects.
//!
//! [`TreeWalk`] drives any number of [`TreeIter`]s in parallel,
//! emitting entries in canonical tree order with per-tree
//! contributions, which makes it both an enumerator (one tree) and a
//! differ (two or more). [`TreeFilter`]s prune entries or stop the
//! walk; recursion and post-order delivery are opt-in.

mod filter;
mod iter;
mod walk;

pub use filter::{PathFilter, TreeFilter, TreePredicate, Verdict};
pub use iter::TreeIter;
pub use walk::TreeWalk;

pub(crate) use iter::entry_path_compare;
