//! Lazy commit producers composing the walk pipeline.

use std::collections::VecDeque;

use tracing::trace;

use super::commit::{flags, CommitIx, CommitPool};
use super::filter::RevFilter;
use super::queue::{DateQueue, PendingQueue};
use super::rewrite::TreeDiffFilter;
use crate::error::{Error, Result};
use crate::tree::Verdict;

/// Output already honors rewrite marks.
pub(crate) const HAS_REWRITE: u32 = 1 << 0;
/// Output still carries rewrite marks a downstream generator must
/// compress.
pub(crate) const NEEDS_REWRITE: u32 = 1 << 1;
/// Output is ordered by descending commit time.
pub(crate) const SORT_COMMIT_TIME_DESC: u32 = 1 << 2;
/// Output is topologically ordered.
pub(crate) const SORT_TOPO: u32 = 1 << 3;
/// Uninteresting commits may appear in the output stream's flags.
pub(crate) const HAS_UNINTERESTING: u32 = 1 << 4;

/// A lazy producer of commits.
///
/// Generators form a chain assembled once per walk; each inspects its
/// upstream's `output_type` bits to decide whether further
/// transformation is required.
pub(crate) trait Generator {
    fn next(&mut self, pool: &mut CommitPool) -> Result<Option<CommitIx>>;
    fn output_type(&self) -> u32;
}

/// The base producer: pops pending commits, enqueues their parents,
/// carries the uninteresting flag, and applies the commit filter.
pub(crate) struct PendingGenerator {
    queue: PendingQueue,
    filter: RevFilter,
    tree_diff: Option<TreeDiffFilter>,
    output: u32,
}

impl PendingGenerator {
    pub fn new(
        queue: PendingQueue,
        filter: RevFilter,
        tree_diff: Option<TreeDiffFilter>,
        mut output: u32,
    ) -> Self {
        if queue.is_date_ordered() {
            output |= SORT_COMMIT_TIME_DESC;
        }
        Self {
            queue,
            filter,
            tree_diff,
            output,
        }
    }
}

impl Generator for PendingGenerator {
    fn next(&mut self, pool: &mut CommitPool) -> Result<Option<CommitIx>> {
        loop {
            let Some(c) = self.queue.pop() else {
                return Ok(None);
            };
            let parents = pool.node(c).parents.clone();
            for p in parents {
                if pool.node(p).has(flags::SEEN) {
                    continue;
                }
                pool.parse_headers(p)?;
                pool.node_mut(p).flags |= flags::SEEN;
                self.queue.add(p, pool);
            }

            if pool.node(c).has(flags::UNINTERESTING) {
                pool.carry_uninteresting(c);
                if self.queue.everybody_has(pool, flags::UNINTERESTING) {
                    // The interesting frontier is exhausted; nothing
                    // below can be interesting again.
                    return Ok(None);
                }
                continue;
            }

            match self.filter.matches(pool, c)? {
                Verdict::Include => {}
                Verdict::Exclude => continue,
                Verdict::Stop => return Ok(None),
            }
            if let Some(td) = self.tree_diff.as_mut() {
                if !td.include(pool, c)? {
                    continue;
                }
            }
            return Ok(Some(c));
        }
    }

    fn output_type(&self) -> u32 {
        self.output
    }
}

/// Buffers the entire upstream output, replaying it first-in
/// first-out. Used ahead of the rewrite generator, which needs every
/// rewrite mark settled before it splices parent edges.
pub(crate) struct BufferedGenerator {
    buffer: VecDeque<CommitIx>,
    output: u32,
}

impl BufferedGenerator {
    pub fn new(mut source: Box<dyn Generator>, pool: &mut CommitPool) -> Result<Self> {
        let mut buffer = VecDeque::new();
        while let Some(c) = source.next(pool)? {
            buffer.push_back(c);
        }
        Ok(Self {
            buffer,
            output: source.output_type(),
        })
    }
}

impl Generator for BufferedGenerator {
    fn next(&mut self, _pool: &mut CommitPool) -> Result<Option<CommitIx>> {
        Ok(self.buffer.pop_front())
    }

    fn output_type(&self) -> u32 {
        self.output
    }
}

/// Kahn's-algorithm topological sorter over in-degrees carried on the
/// commit nodes. Buffers the whole upstream at construction.
pub(crate) struct TopoSortGenerator {
    pending: VecDeque<CommitIx>,
    output: u32,
}

impl TopoSortGenerator {
    pub fn new(mut source: Box<dyn Generator>, pool: &mut CommitPool) -> Result<Self> {
        let mut pending = VecDeque::new();
        while let Some(c) = source.next(pool)? {
            let parents = pool.node(c).parents.clone();
            for p in parents {
                pool.node_mut(p).in_degree += 1;
            }
            pending.push_back(c);
        }
        Ok(Self {
            pending,
            output: source.output_type() | SORT_TOPO,
        })
    }
}

impl Generator for TopoSortGenerator {
    fn next(&mut self, pool: &mut CommitPool) -> Result<Option<CommitIx>> {
        loop {
            let Some(c) = self.pending.pop_front() else {
                return Ok(None);
            };
            if pool.node(c).in_degree > 0 {
                // A child has not been emitted yet; hold this commit
                // until the last child releases it.
                pool.node_mut(c).flags |= flags::TOPO_DELAY;
                continue;
            }
            let parents = pool.node(c).parents.clone();
            for p in parents {
                let node = pool.node_mut(p);
                node.in_degree -= 1;
                if node.in_degree == 0 && node.has(flags::TOPO_DELAY) {
                    node.flags &= !flags::TOPO_DELAY;
                    self.pending.push_front(p);
                }
            }
            return Ok(Some(c));
        }
    }

    fn output_type(&self) -> u32 {
        self.output
    }
}

/// Buffers the entire upstream and replays it last-in first-out.
pub(crate) struct LifoGenerator {
    buffer: Vec<CommitIx>,
    output: u32,
}

impl LifoGenerator {
    pub fn new(mut source: Box<dyn Generator>, pool: &mut CommitPool) -> Result<Self> {
        let mut buffer = Vec::new();
        while let Some(c) = source.next(pool)? {
            buffer.push(c);
        }
        Ok(Self {
            buffer,
            output: source.output_type(),
        })
    }
}

impl Generator for LifoGenerator {
    fn next(&mut self, _pool: &mut CommitPool) -> Result<Option<CommitIx>> {
        Ok(self.buffer.pop())
    }

    fn output_type(&self) -> u32 {
        self.output
    }
}

/// Passes interesting commits through, remembering their
/// uninteresting parents; once the source runs dry those parents are
/// emitted exactly once each, tagged as boundaries.
pub(crate) struct BoundaryGenerator {
    source: Box<dyn Generator>,
    held: VecDeque<CommitIx>,
    draining: bool,
}

impl BoundaryGenerator {
    pub fn new(source: Box<dyn Generator>) -> Self {
        Self {
            source,
            held: VecDeque::new(),
            draining: false,
        }
    }
}

impl Generator for BoundaryGenerator {
    fn next(&mut self, pool: &mut CommitPool) -> Result<Option<CommitIx>> {
        if !self.draining {
            match self.source.next(pool)? {
                Some(c) => {
                    let parents = pool.node(c).parents.clone();
                    for p in parents {
                        if pool.node(p).has(flags::UNINTERESTING) {
                            self.held.push_back(p);
                        }
                    }
                    return Ok(Some(c));
                }
                None => self.draining = true,
            }
        }
        while let Some(p) = self.held.pop_front() {
            if pool.node(p).has(flags::BOUNDARY) {
                continue;
            }
            pool.parse_headers(p)?;
            pool.node_mut(p).flags |= flags::BOUNDARY;
            trace!(commit = %pool.node(p).id, "emitting boundary commit");
            return Ok(Some(p));
        }
        Ok(None)
    }

    fn output_type(&self) -> u32 {
        self.source.output_type()
    }
}

/// Swallows commits that were discovered to be uninteresting after
/// they had already entered the pipeline.
pub(crate) struct FixUninterestingGenerator {
    source: Box<dyn Generator>,
}

impl FixUninterestingGenerator {
    pub fn new(source: Box<dyn Generator>) -> Self {
        Self { source }
    }
}

impl Generator for FixUninterestingGenerator {
    fn next(&mut self, pool: &mut CommitPool) -> Result<Option<CommitIx>> {
        while let Some(c) = self.source.next(pool)? {
            if !pool.node(c).has(flags::UNINTERESTING) {
                return Ok(Some(c));
            }
        }
        Ok(None)
    }

    fn output_type(&self) -> u32 {
        self.source.output_type()
    }
}

/// Emits the merge bases of the start set: commits reachable from
/// every start, maximal among themselves.
///
/// Each start commit is colored with a distinct branch bit; bits flow
/// down parent edges as the date queue drains. A commit carrying every
/// bit is a merge base, and the merge-base mark it then spreads keeps
/// its own ancestors from being reported as well.
pub(crate) struct MergeBaseGenerator {
    pending: DateQueue,
    branch_mask: u32,
}

impl MergeBaseGenerator {
    pub fn new(pool: &mut CommitPool, starts: &[CommitIx]) -> Result<Self> {
        if starts.len() > flags::BRANCH_LIMIT as usize {
            return Err(Error::IllegalState(
                "too many start commits for merge base generation",
            ));
        }
        let mut pending = DateQueue::new();
        let mut branch_mask = 0u32;
        for (i, &ix) in starts.iter().enumerate() {
            let bit = 1u32 << (flags::BRANCH_SHIFT + i as u32);
            branch_mask |= bit;
            pool.node_mut(ix).flags |= bit;
            pending.add(ix, pool);
        }
        Ok(Self {
            pending,
            branch_mask,
        })
    }

    /// Spreads `carry` down through every parsed ancestor, stopping
    /// where all the bits are already present.
    fn carry_onto_history(&self, pool: &mut CommitPool, seeds: &[CommitIx], carry: u32) {
        let mut stack: Vec<CommitIx> = seeds.to_vec();
        while let Some(ix) = stack.pop() {
            let node = pool.node_mut(ix);
            let have_all = node.flags & carry == carry;
            node.flags |= carry;
            if have_all {
                continue;
            }
            stack.extend(node.parents.iter().copied());
        }
    }
}

impl Generator for MergeBaseGenerator {
    fn next(&mut self, pool: &mut CommitPool) -> Result<Option<CommitIx>> {
        loop {
            let Some(c) = self.pending.pop() else {
                return Ok(None);
            };
            let carry = pool.node(c).flags & self.branch_mask;
            let is_base = carry == self.branch_mask;
            let effective = if is_base {
                carry | flags::MERGE_BASE
            } else {
                carry
            };
            let parents = pool.node(c).parents.clone();
            self.carry_onto_history(pool, &parents, effective);

            if pool.node(c).has(flags::MERGE_BASE) {
                // An ancestor of a merge base already reported.
                continue;
            }
            if is_base {
                pool.node_mut(c).flags |= flags::MERGE_BASE;
                return Ok(Some(c));
            }
            for p in parents {
                if pool.node(p).has(flags::SEEN) {
                    continue;
                }
                pool.parse_headers(p)?;
                pool.node_mut(p).flags |= flags::SEEN;
                self.pending.add(p, pool);
            }
        }
    }

    fn output_type(&self) -> u32 {
        0
    }
}
