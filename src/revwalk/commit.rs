//! Interned commit nodes and their parser.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::model::{ObjectId, ObjectKind};
use crate::odb::ObjectDatabase;

/// Index of a commit in its walker's intern pool.
pub(crate) type CommitIx = usize;

/// Walker state bits carried on every commit node.
pub mod flags {
    /// The commit has been enqueued once; it will not be enqueued
    /// again.
    pub const SEEN: u32 = 1 << 0;
    /// Headers have been parsed.
    pub const PARSED: u32 = 1 << 1;
    /// The commit is outside the interesting frontier.
    pub const UNINTERESTING: u32 = 1 << 2;
    /// The active tree filter found no change against the commit's
    /// parent(s); parent edges may be spliced through it.
    pub const REWRITE: u32 = 1 << 3;
    /// Held back by the topological sorter until all children have
    /// been emitted.
    pub const TOPO_DELAY: u32 = 1 << 4;
    /// Emitted as a boundary commit: uninteresting, but a parent of
    /// an interesting commit.
    pub const BOUNDARY: u32 = 1 << 5;
    /// Popped (or ancestor of a popped merge base) during merge-base
    /// generation.
    pub const MERGE_BASE: u32 = 1 << 6;

    /// First bit available to the merge-base branch mask.
    pub(crate) const BRANCH_SHIFT: u32 = 8;
    /// Number of distinct branch bits the merge-base generator can
    /// allocate.
    pub(crate) const BRANCH_LIMIT: u32 = 24;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseState {
    Unparsed,
    Headers,
    Full,
}

pub(crate) struct CommitNode {
    pub id: ObjectId,
    pub state: ParseState,
    pub tree: ObjectId,
    pub parents: SmallVec<[CommitIx; 2]>,
    pub commit_time: i64,
    pub author: String,
    pub committer: String,
    pub message: String,
    pub flags: u32,
    pub in_degree: u32,
}

impl CommitNode {
    fn new(id: ObjectId) -> Self {
        Self {
            id,
            state: ParseState::Unparsed,
            tree: ObjectId::ZERO,
            parents: SmallVec::new(),
            commit_time: 0,
            author: String::new(),
            committer: String::new(),
            message: String::new(),
            flags: 0,
            in_degree: 0,
        }
    }

    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// Per-walker intern table of commit nodes, keyed by object id.
///
/// Parent edges are stored as pool indices resolved lazily, so the
/// commit graph's fan-in never creates ownership cycles.
pub(crate) struct CommitPool {
    odb: Arc<dyn ObjectDatabase>,
    nodes: Vec<CommitNode>,
    by_id: FxHashMap<ObjectId, CommitIx>,
}

impl CommitPool {
    pub fn new(odb: Arc<dyn ObjectDatabase>) -> Self {
        Self {
            odb,
            nodes: Vec::new(),
            by_id: FxHashMap::default(),
        }
    }

    pub fn odb(&self) -> &Arc<dyn ObjectDatabase> {
        &self.odb
    }

    /// Interns `id`, creating an unparsed node on first sight.
    pub fn lookup(&mut self, id: ObjectId) -> CommitIx {
        if let Some(&ix) = self.by_id.get(&id) {
            return ix;
        }
        let ix = self.nodes.len();
        self.nodes.push(CommitNode::new(id));
        self.by_id.insert(id, ix);
        ix
    }

    pub fn find(&self, id: &ObjectId) -> Option<CommitIx> {
        self.by_id.get(id).copied()
    }

    pub fn node(&self, ix: CommitIx) -> &CommitNode {
        &self.nodes[ix]
    }

    pub fn node_mut(&mut self, ix: CommitIx) -> &mut CommitNode {
        &mut self.nodes[ix]
    }

    /// Clears walk state on every node, keeping parse results.
    pub fn reset_walk_state(&mut self) {
        for node in &mut self.nodes {
            node.flags &= flags::PARSED;
            node.in_degree = 0;
        }
    }

    /// Parses identity headers (tree, parents, author, committer,
    /// commit time). Idempotent.
    pub fn parse_headers(&mut self, ix: CommitIx) -> Result<()> {
        if self.nodes[ix].state != ParseState::Unparsed {
            return Ok(());
        }
        let id = self.nodes[ix].id;
        let obj = self.odb.open_as(&id, ObjectKind::Commit)?;
        let parsed = parse_commit_text(&id, &obj.data)?;
        let parent_ixs: SmallVec<[CommitIx; 2]> = parsed
            .parents
            .iter()
            .map(|pid| self.lookup(*pid))
            .collect();
        let node = &mut self.nodes[ix];
        node.tree = parsed.tree;
        node.parents = parent_ixs;
        node.commit_time = parsed.commit_time;
        node.author = parsed.author;
        node.committer = parsed.committer;
        node.state = ParseState::Headers;
        node.flags |= flags::PARSED;
        Ok(())
    }

    /// Parses the full body, message included. Idempotent.
    pub fn parse_full(&mut self, ix: CommitIx) -> Result<()> {
        self.parse_headers(ix)?;
        if self.nodes[ix].state == ParseState::Full {
            return Ok(());
        }
        let id = self.nodes[ix].id;
        let obj = self.odb.open_as(&id, ObjectKind::Commit)?;
        let message = match find_body(&obj.data) {
            Some(at) => String::from_utf8_lossy(&obj.data[at..]).into_owned(),
            None => String::new(),
        };
        let node = &mut self.nodes[ix];
        node.message = message;
        node.state = ParseState::Full;
        Ok(())
    }

    /// Propagates `UNINTERESTING` from `ix` down every parent edge of
    /// already-parsed history.
    pub fn carry_uninteresting(&mut self, ix: CommitIx) {
        let mut stack: Vec<CommitIx> = self.nodes[ix].parents.to_vec();
        while let Some(p) = stack.pop() {
            let node = &mut self.nodes[p];
            if node.has(flags::UNINTERESTING) {
                continue;
            }
            node.flags |= flags::UNINTERESTING;
            stack.extend(node.parents.iter().copied());
        }
    }
}

struct ParsedCommit {
    tree: ObjectId,
    parents: SmallVec<[ObjectId; 2]>,
    author: String,
    committer: String,
    commit_time: i64,
}

fn find_body(raw: &[u8]) -> Option<usize> {
    raw.windows(2).position(|w| w == b"\n\n").map(|p| p + 2)
}

fn parse_commit_text(id: &ObjectId, raw: &[u8]) -> Result<ParsedCommit> {
    let header_end = find_body(raw).map(|p| p - 2).unwrap_or(raw.len());
    let mut tree = None;
    let mut parents = SmallVec::new();
    let mut author = String::new();
    let mut committer = String::new();
    let mut commit_time = 0i64;

    for line in raw[..header_end].split(|&b| b == b'\n') {
        if let Some(rest) = line.strip_prefix(b"tree ".as_slice()) {
            let text = std::str::from_utf8(rest)
                .map_err(|_| Error::corrupt_object(*id, "non-ascii tree header"))?;
            tree = Some(
                ObjectId::from_hex(text)
                    .map_err(|_| Error::corrupt_object(*id, "malformed tree header"))?,
            );
        } else if let Some(rest) = line.strip_prefix(b"parent ".as_slice()) {
            let text = std::str::from_utf8(rest)
                .map_err(|_| Error::corrupt_object(*id, "non-ascii parent header"))?;
            parents.push(
                ObjectId::from_hex(text)
                    .map_err(|_| Error::corrupt_object(*id, "malformed parent header"))?,
            );
        } else if let Some(rest) = line.strip_prefix(b"author ".as_slice()) {
            author = String::from_utf8_lossy(rest).into_owned();
        } else if let Some(rest) = line.strip_prefix(b"committer ".as_slice()) {
            committer = String::from_utf8_lossy(rest).into_owned();
            commit_time = committer_time(&committer);
        }
    }

    let tree = tree.ok_or_else(|| Error::corrupt_object(*id, "missing tree header"))?;
    Ok(ParsedCommit {
        tree,
        parents,
        author,
        committer,
        commit_time,
    })
}

/// Extracts the epoch seconds from an identity line of the form
/// `Name <email> time zone`. Returns 0 when the line is not in that
/// shape, matching the lenient behavior of loose parsers elsewhere.
fn committer_time(line: &str) -> i64 {
    let mut tokens = line.rsplit(' ');
    let _zone = tokens.next();
    tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0)
}
