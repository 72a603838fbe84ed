//! Commit-graph walking.
//!
//! [`RevWalk`] enumerates commits reachable from a start set, capped
//! by an uninteresting set, filtered by commit and tree filters, and
//! ordered by a combinable set of sorts. The walk is produced by a
//! pipeline of lazy generators assembled from the configuration on the
//! first [`next`](RevWalk::next) call.

pub mod commit;
mod filter;
mod generator;
mod queue;
mod rewrite;
mod sort;

pub use commit::flags;
pub use filter::{CommitView, RevFilter, RevPredicate};
pub use sort::{RevSort, SortSet};

use std::sync::Arc;

use tracing::debug;

use self::commit::{CommitIx, CommitPool};
use self::generator::{
    BoundaryGenerator, BufferedGenerator, FixUninterestingGenerator, Generator, LifoGenerator,
    MergeBaseGenerator, PendingGenerator, TopoSortGenerator, HAS_REWRITE, HAS_UNINTERESTING,
    NEEDS_REWRITE, SORT_TOPO,
};
use self::queue::PendingQueue;
use self::rewrite::{RewriteGenerator, TreeDiffFilter};
use crate::error::{Error, Result};
use crate::model::ObjectId;
use crate::odb::ObjectDatabase;
use crate::tree::TreeFilter;

/// Walks the commit graph.
///
/// An instance is single-threaded and keeps a per-walker parse cache
/// of commits; run one walker per thread over a shared object
/// database.
pub struct RevWalk {
    pool: CommitPool,
    starts: Vec<CommitIx>,
    uninteresting_seeded: bool,
    rev_filter: RevFilter,
    tree_filter: TreeFilter,
    sorts: SortSet,
    pipeline: Option<Box<dyn Generator>>,
}

impl RevWalk {
    /// Creates a walker over `odb`.
    pub fn new(odb: Arc<dyn ObjectDatabase>) -> RevWalk {
        RevWalk {
            pool: CommitPool::new(odb),
            starts: Vec::new(),
            uninteresting_seeded: false,
            rev_filter: RevFilter::All,
            tree_filter: TreeFilter::All,
            sorts: SortSet::new(),
            pipeline: None,
        }
    }

    /// Adds a commit the walk starts from.
    pub fn mark_start(&mut self, id: ObjectId) -> Result<()> {
        self.assert_not_started()?;
        let ix = self.pool.lookup(id);
        self.pool.parse_headers(ix)?;
        if !self.pool.node(ix).has(flags::SEEN) {
            self.pool.node_mut(ix).flags |= flags::SEEN;
            self.starts.push(ix);
        }
        Ok(())
    }

    /// Marks a commit, and everything it can reach, uninteresting.
    pub fn mark_uninteresting(&mut self, id: ObjectId) -> Result<()> {
        self.assert_not_started()?;
        let ix = self.pool.lookup(id);
        self.pool.parse_headers(ix)?;
        self.pool.node_mut(ix).flags |= flags::UNINTERESTING;
        self.pool.carry_uninteresting(ix);
        self.uninteresting_seeded = true;
        if !self.pool.node(ix).has(flags::SEEN) {
            self.pool.node_mut(ix).flags |= flags::SEEN;
            self.starts.push(ix);
        }
        Ok(())
    }

    /// Installs the commit filter.
    pub fn set_rev_filter(&mut self, filter: RevFilter) -> Result<()> {
        self.assert_not_started()?;
        self.rev_filter = filter;
        Ok(())
    }

    /// Installs the tree filter restricting history to paths it
    /// matches.
    pub fn set_tree_filter(&mut self, filter: TreeFilter) -> Result<()> {
        self.assert_not_started()?;
        self.tree_filter = filter;
        Ok(())
    }

    /// Replaces the sort set with a single option.
    pub fn sort(&mut self, sort: RevSort) -> Result<()> {
        self.assert_not_started()?;
        self.sorts.replace(sort);
        Ok(())
    }

    /// Adds or removes one sort option.
    pub fn sort_add(&mut self, sort: RevSort, enabled: bool) -> Result<()> {
        self.assert_not_started()?;
        self.sorts.set(sort, enabled);
        Ok(())
    }

    /// Returns the next commit, or None at the end of the walk.
    ///
    /// The first call assembles the generator pipeline; if assembly
    /// fails the walker is left unstarted, so the configuration can be
    /// corrected and `next` retried.
    pub fn next(&mut self) -> Result<Option<ObjectId>> {
        if self.pipeline.is_none() {
            let pipeline = self.assemble()?;
            self.pipeline = Some(pipeline);
        }
        let generator = self.pipeline.as_mut().expect("pipeline just installed");
        match generator.next(&mut self.pool)? {
            Some(ix) => Ok(Some(self.pool.node(ix).id)),
            None => Ok(None),
        }
    }

    /// Forgets all starts and walk state, keeping parsed commits and
    /// the filter/sort configuration.
    pub fn reset(&mut self) {
        self.pipeline = None;
        self.starts.clear();
        self.uninteresting_seeded = false;
        self.pool.reset_walk_state();
    }

    /// Parses a commit's headers into the walker's cache without
    /// walking.
    pub fn parse_commit(&mut self, id: ObjectId) -> Result<()> {
        let ix = self.pool.lookup(id);
        self.pool.parse_headers(ix)
    }

    /// Committer timestamp of a parsed commit.
    pub fn commit_time(&self, id: &ObjectId) -> Option<i64> {
        self.parsed_node(id).map(|n| n.commit_time)
    }

    /// Parent ids of a parsed commit, as rewritten by the walk when a
    /// tree filter was active.
    pub fn parents_of(&self, id: &ObjectId) -> Option<Vec<ObjectId>> {
        self.parsed_node(id)
            .map(|n| n.parents.iter().map(|&p| self.pool.node(p).id).collect())
    }

    /// Tree id of a parsed commit.
    pub fn tree_of(&self, id: &ObjectId) -> Option<ObjectId> {
        self.parsed_node(id).map(|n| n.tree)
    }

    /// Walk flags of a known commit.
    pub fn flags_of(&self, id: &ObjectId) -> Option<u32> {
        self.pool.find(id).map(|ix| self.pool.node(ix).flags)
    }

    /// Whether the commit was emitted as a boundary.
    pub fn is_boundary(&self, id: &ObjectId) -> bool {
        self.flags_of(id)
            .is_some_and(|f| f & flags::BOUNDARY != 0)
    }

    /// Author identity line of a parsed commit.
    pub fn author_of(&self, id: &ObjectId) -> Option<String> {
        self.parsed_node(id).map(|n| n.author.clone())
    }

    /// Committer identity line of a parsed commit.
    pub fn committer_of(&self, id: &ObjectId) -> Option<String> {
        self.parsed_node(id).map(|n| n.committer.clone())
    }

    /// Full commit message, parsing the body on demand.
    pub fn message_of(&mut self, id: &ObjectId) -> Result<String> {
        let ix = self.pool.lookup(*id);
        self.pool.parse_full(ix)?;
        Ok(self.pool.node(ix).message.clone())
    }

    fn parsed_node(&self, id: &ObjectId) -> Option<&commit::CommitNode> {
        let ix = self.pool.find(id)?;
        let node = self.pool.node(ix);
        if node.has(flags::PARSED) {
            Some(node)
        } else {
            None
        }
    }

    fn assert_not_started(&self) -> Result<()> {
        if self.pipeline.is_some() {
            return Err(Error::IllegalState(
                "walk already started; reset before reconfiguring",
            ));
        }
        Ok(())
    }

    /// Builds the generator pipeline from the walker configuration.
    ///
    /// Assembly runs in ordered phases; each phase inspects the output
    /// bits declared by the phases before it.
    fn assemble(&mut self) -> Result<Box<dyn Generator>> {
        // Merge-base generation replaces ordinary traversal outright.
        if matches!(self.rev_filter, RevFilter::MergeBase) {
            if !self.tree_filter.is_all() {
                return Err(Error::IllegalState(
                    "merge base filter cannot be combined with a tree filter",
                ));
            }
            let mbg = MergeBaseGenerator::new(&mut self.pool, &self.starts)?;
            return Ok(Box::new(mbg));
        }

        // A boundary can only exist below an uninteresting cut.
        let boundary = self.sorts.contains(RevSort::Boundary) && self.uninteresting_seeded;

        let queue = if self.sorts.contains(RevSort::StartOrder) {
            PendingQueue::fifo(self.starts.iter().copied())
        } else {
            PendingQueue::date(self.starts.iter().copied(), &self.pool)
        };

        let mut output = 0u32;
        if self.uninteresting_seeded {
            output |= HAS_UNINTERESTING;
        }
        let tree_diff = if self.tree_filter.is_all() {
            None
        } else {
            output |= HAS_REWRITE | NEEDS_REWRITE;
            Some(TreeDiffFilter::new(
                Arc::clone(self.pool.odb()),
                self.tree_filter.clone(),
            ))
        };

        let mut g: Box<dyn Generator> = Box::new(PendingGenerator::new(
            queue,
            self.rev_filter.clone(),
            tree_diff,
            output,
        ));

        if g.output_type() & NEEDS_REWRITE != 0 {
            // Rewrite marks settle only once the pending generator
            // has processed everything, so buffer it out first.
            g = Box::new(BufferedGenerator::new(g, &mut self.pool)?);
            g = Box::new(RewriteGenerator::new(g));
        }
        if self.sorts.contains(RevSort::Topo) && g.output_type() & SORT_TOPO == 0 {
            g = Box::new(TopoSortGenerator::new(g, &mut self.pool)?);
        }
        if self.sorts.contains(RevSort::Reverse) {
            g = Box::new(LifoGenerator::new(g, &mut self.pool)?);
        }
        if boundary {
            g = Box::new(BoundaryGenerator::new(g));
        } else if self.uninteresting_seeded {
            g = Box::new(FixUninterestingGenerator::new(g));
        }

        debug!(
            starts = self.starts.len(),
            output_type = g.output_type(),
            "assembled revision walk pipeline"
        );
        Ok(g)
    }
}
