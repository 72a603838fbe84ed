//! Path-restricted history: tree-diff filtering and parent rewriting.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::trace;

use super::commit::{flags, CommitIx, CommitPool};
use super::generator::{Generator, NEEDS_REWRITE};
use crate::error::Result;
use crate::odb::ObjectDatabase;
use crate::tree::{TreeFilter, TreeWalk};

/// Decides whether a commit touches the filtered paths, marking
/// untouched commits for rewrite.
///
/// A root commit is included when its tree holds any matching path. A
/// single-parent commit is included when the filtered diff against its
/// parent is non-empty; otherwise it is marked `REWRITE` and dropped.
/// A merge identical to any parent under the filter is likewise marked
/// and dropped.
pub(crate) struct TreeDiffFilter {
    walk: TreeWalk,
}

impl TreeDiffFilter {
    pub fn new(odb: Arc<dyn ObjectDatabase>, filter: TreeFilter) -> Self {
        let mut walk = TreeWalk::new(odb);
        walk.set_recursive(filter.should_be_recursive());
        walk.set_filter(filter.and(TreeFilter::AnyDiff));
        Self { walk }
    }

    pub fn include(&mut self, pool: &mut CommitPool, c: CommitIx) -> Result<bool> {
        let parents = pool.node(c).parents.clone();
        for &p in &parents {
            pool.parse_headers(p)?;
        }
        let tree = pool.node(c).tree;

        match parents.len() {
            0 => {
                self.walk.reset_trees(&[tree])?;
                Ok(self.walk.next()?)
            }
            1 => {
                let parent_tree = pool.node(parents[0]).tree;
                self.walk.reset_trees(&[parent_tree, tree])?;
                if self.walk.next()? {
                    Ok(true)
                } else {
                    pool.node_mut(c).flags |= flags::REWRITE;
                    trace!(commit = %pool.node(c).id, "tree unchanged, marked for rewrite");
                    Ok(false)
                }
            }
            _ => {
                for &p in &parents {
                    let parent_tree = pool.node(p).tree;
                    self.walk.reset_trees(&[parent_tree, tree])?;
                    if !self.walk.next()? {
                        // Identical to this parent; history follows
                        // that side alone.
                        pool.node_mut(c).flags |= flags::REWRITE;
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

/// Compresses chains of rewrite-marked parents, splicing each emitted
/// commit's parent edges past commits the tree filter proved
/// irrelevant.
///
/// Must run over a fully buffered stream: a parent's rewrite mark is
/// only settled once the pending generator has processed it.
pub(crate) struct RewriteGenerator {
    source: Box<dyn Generator>,
}

impl RewriteGenerator {
    pub fn new(source: Box<dyn Generator>) -> Self {
        Self { source }
    }

    /// Walks up a chain of rewritten commits to the first parent worth
    /// keeping: a merge, an uninteresting commit, or one the filter
    /// included. Returns None when the chain ends at a rewritten root.
    fn rewrite_one(pool: &CommitPool, mut p: CommitIx) -> Option<CommitIx> {
        loop {
            let node = pool.node(p);
            if node.parents.len() > 1 {
                return Some(p);
            }
            if node.has(flags::UNINTERESTING) {
                // Keep the cut point visible.
                return Some(p);
            }
            if !node.has(flags::REWRITE) {
                return Some(p);
            }
            if node.parents.is_empty() {
                return None;
            }
            p = node.parents[0];
        }
    }
}

impl Generator for RewriteGenerator {
    fn next(&mut self, pool: &mut CommitPool) -> Result<Option<CommitIx>> {
        let Some(c) = self.source.next(pool)? else {
            return Ok(None);
        };
        let old_parents = pool.node(c).parents.clone();
        let mut new_parents: SmallVec<[CommitIx; 2]> = SmallVec::new();
        let mut rewrote = false;
        for &p in &old_parents {
            match Self::rewrite_one(pool, p) {
                Some(kept) => {
                    if kept != p {
                        rewrote = true;
                    }
                    if !new_parents.contains(&kept) {
                        new_parents.push(kept);
                    } else {
                        rewrote = true;
                    }
                }
                None => rewrote = true,
            }
        }
        if rewrote {
            pool.node_mut(c).parents = new_parents;
        }
        Ok(Some(c))
    }

    fn output_type(&self) -> u32 {
        self.source.output_type() & !NEEDS_REWRITE
    }
}
