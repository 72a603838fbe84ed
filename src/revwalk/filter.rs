//! Commit filters for the revision walker.

use std::fmt;
use std::sync::Arc;

use super::commit::{CommitIx, CommitPool};
use crate::error::{Error, Result};
use crate::model::ObjectId;
use crate::tree::Verdict;

/// Read-only view of a commit handed to custom predicates.
pub struct CommitView<'a> {
    /// Commit identity.
    pub id: ObjectId,
    /// Committer timestamp, epoch seconds.
    pub commit_time: i64,
    /// Raw author identity line.
    pub author: &'a str,
    /// Raw committer identity line.
    pub committer: &'a str,
    /// Number of parent edges.
    pub parent_count: usize,
}

/// A caller-supplied commit predicate.
pub trait RevPredicate: Send + Sync {
    /// Tests one commit.
    fn include(&self, commit: &CommitView<'_>) -> Result<Verdict>;
}

/// A predicate over commits, applied by the pending generator before
/// a commit is emitted.
#[derive(Clone)]
pub enum RevFilter {
    /// Accepts every commit.
    All,
    /// Sentinel selecting merge-base generation instead of ordinary
    /// traversal. Cannot be combined with other filters or a tree
    /// filter.
    MergeBase,
    /// Accepts commits whose author line contains the pattern.
    Author(String),
    /// Accepts commits whose committer line contains the pattern.
    Committer(String),
    /// Accepts commits at or after the given committer time. Older
    /// commits stop a date-ordered walk, since nothing younger can
    /// follow them.
    CommitterAfter(i64),
    /// Accepts commits at or before the given committer time.
    CommitterBefore(i64),
    /// Short-circuiting conjunction.
    And(Box<RevFilter>, Box<RevFilter>),
    /// Short-circuiting disjunction.
    Or(Box<RevFilter>, Box<RevFilter>),
    /// Negation; a stopped inner filter matches everything after its
    /// stop point.
    Not(Box<RevFilter>),
    /// Caller-supplied predicate.
    Custom(Arc<dyn RevPredicate>),
}

impl RevFilter {
    /// Whether this is the accept-everything sentinel.
    pub fn is_all(&self) -> bool {
        matches!(self, RevFilter::All)
    }

    pub(crate) fn matches(&self, pool: &CommitPool, ix: CommitIx) -> Result<Verdict> {
        let node = pool.node(ix);
        match self {
            RevFilter::All => Ok(Verdict::Include),
            RevFilter::MergeBase => Err(Error::IllegalState(
                "merge base filter cannot be combined with other filters",
            )),
            RevFilter::Author(pattern) => Ok(if node.author.contains(pattern.as_str()) {
                Verdict::Include
            } else {
                Verdict::Exclude
            }),
            RevFilter::Committer(pattern) => Ok(if node.committer.contains(pattern.as_str()) {
                Verdict::Include
            } else {
                Verdict::Exclude
            }),
            RevFilter::CommitterAfter(when) => Ok(if node.commit_time >= *when {
                Verdict::Include
            } else {
                Verdict::Stop
            }),
            RevFilter::CommitterBefore(when) => Ok(if node.commit_time <= *when {
                Verdict::Include
            } else {
                Verdict::Exclude
            }),
            RevFilter::And(a, b) => match a.matches(pool, ix)? {
                Verdict::Include => b.matches(pool, ix),
                other => Ok(other),
            },
            RevFilter::Or(a, b) => match a.matches(pool, ix)? {
                Verdict::Include => Ok(Verdict::Include),
                Verdict::Stop => Ok(Verdict::Stop),
                Verdict::Exclude => b.matches(pool, ix),
            },
            RevFilter::Not(inner) => match inner.matches(pool, ix)? {
                Verdict::Include => Ok(Verdict::Exclude),
                Verdict::Exclude | Verdict::Stop => Ok(Verdict::Include),
            },
            RevFilter::Custom(p) => {
                let view = CommitView {
                    id: node.id,
                    commit_time: node.commit_time,
                    author: &node.author,
                    committer: &node.committer,
                    parent_count: node.parents.len(),
                };
                p.include(&view)
            }
        }
    }

    /// Conjoins two filters, collapsing the `All` sentinel.
    pub fn and(self, other: RevFilter) -> RevFilter {
        match (self, other) {
            (RevFilter::All, f) | (f, RevFilter::All) => f,
            (a, b) => RevFilter::And(Box::new(a), Box::new(b)),
        }
    }
}

impl fmt::Debug for RevFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevFilter::All => f.write_str("All"),
            RevFilter::MergeBase => f.write_str("MergeBase"),
            RevFilter::Author(p) => write!(f, "Author({p})"),
            RevFilter::Committer(p) => write!(f, "Committer({p})"),
            RevFilter::CommitterAfter(t) => write!(f, "CommitterAfter({t})"),
            RevFilter::CommitterBefore(t) => write!(f, "CommitterBefore({t})"),
            RevFilter::And(a, b) => write!(f, "And({a:?}, {b:?})"),
            RevFilter::Or(a, b) => write!(f, "Or({a:?}, {b:?})"),
            RevFilter::Not(inner) => write!(f, "Not({inner:?})"),
            RevFilter::Custom(_) => f.write_str("Custom"),
        }
    }
}
