//! Entry filters for tree walking.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::tree::walk::TreeWalk;

/// Outcome of testing one entry against a filter.
///
/// `Stop` is control flow, not an error: it tells the walker the
/// filter can never match again (the walk has passed every path the
/// filter cares about) and terminates the walk cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deliver the entry.
    Include,
    /// Suppress the entry and continue.
    Exclude,
    /// Terminate the walk cleanly.
    Stop,
}

/// An arbitrary caller-supplied predicate.
pub trait TreePredicate: Send + Sync {
    /// Tests the walker's current entry.
    fn matches(&self, walk: &TreeWalk) -> Result<Verdict>;

    /// Whether the walker should recurse to evaluate this predicate
    /// usefully.
    fn recursive_hint(&self) -> bool {
        false
    }
}

/// A predicate over the walker's current entry.
///
/// Path filters precompile their prefix bytes, so each test is a plain
/// byte comparison against the current path with no allocation.
#[derive(Clone)]
pub enum TreeFilter {
    /// Accepts every entry.
    All,
    /// Accepts entries equal to or under one path prefix.
    Path(PathFilter),
    /// Accepts entries matching any of several path prefixes.
    PathGroup(Vec<PathFilter>),
    /// Accepts entries whose trees do not all agree on mode and id.
    AnyDiff,
    /// Short-circuiting conjunction.
    And(Box<TreeFilter>, Box<TreeFilter>),
    /// Short-circuiting disjunction.
    Or(Box<TreeFilter>, Box<TreeFilter>),
    /// Negation. `Stop` from the inner filter is swallowed, because a
    /// negated filter matches everything past the inner prefix.
    Not(Box<TreeFilter>),
    /// Caller-supplied predicate.
    Custom(Arc<dyn TreePredicate>),
}

impl TreeFilter {
    /// Builds a single-path filter. The path uses `/` separators with
    /// no leading or trailing separator.
    pub fn path(path: &str) -> TreeFilter {
        TreeFilter::Path(PathFilter::new(path))
    }

    /// Builds a group filter over several paths.
    pub fn path_group<I, S>(paths: I) -> TreeFilter
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filters: Vec<PathFilter> = paths
            .into_iter()
            .map(|p| PathFilter::new(p.as_ref()))
            .collect();
        if filters.len() == 1 {
            TreeFilter::Path(filters.into_iter().next().expect("one filter"))
        } else {
            TreeFilter::PathGroup(filters)
        }
    }

    /// Tests the walker's current entry.
    pub fn matches(&self, walk: &TreeWalk) -> Result<Verdict> {
        match self {
            TreeFilter::All => Ok(Verdict::Include),
            TreeFilter::Path(p) => Ok(p.test(walk)),
            TreeFilter::PathGroup(group) => {
                let mut all_passed = true;
                let mut included = false;
                for p in group {
                    match p.test(walk) {
                        Verdict::Include => {
                            included = true;
                            all_passed = false;
                        }
                        Verdict::Exclude => all_passed = false,
                        Verdict::Stop => {}
                    }
                }
                if included {
                    Ok(Verdict::Include)
                } else if all_passed {
                    // Every prefix is behind the walk now.
                    Ok(Verdict::Stop)
                } else {
                    Ok(Verdict::Exclude)
                }
            }
            TreeFilter::AnyDiff => Ok(any_diff(walk)),
            TreeFilter::And(a, b) => match a.matches(walk)? {
                Verdict::Include => b.matches(walk),
                other => Ok(other),
            },
            TreeFilter::Or(a, b) => match a.matches(walk)? {
                Verdict::Include => Ok(Verdict::Include),
                Verdict::Stop => Ok(Verdict::Stop),
                Verdict::Exclude => b.matches(walk),
            },
            TreeFilter::Not(inner) => match inner.matches(walk)? {
                Verdict::Include => Ok(Verdict::Exclude),
                Verdict::Exclude | Verdict::Stop => Ok(Verdict::Include),
            },
            TreeFilter::Custom(p) => p.matches(walk),
        }
    }

    /// Whether the walker should enable recursion for this filter to
    /// see the entries it was written against.
    pub fn should_be_recursive(&self) -> bool {
        match self {
            TreeFilter::All | TreeFilter::AnyDiff => false,
            TreeFilter::Path(_) | TreeFilter::PathGroup(_) => true,
            TreeFilter::And(a, b) | TreeFilter::Or(a, b) => {
                a.should_be_recursive() || b.should_be_recursive()
            }
            TreeFilter::Not(inner) => inner.should_be_recursive(),
            TreeFilter::Custom(p) => p.recursive_hint(),
        }
    }

    /// Whether this is the accept-everything sentinel.
    pub fn is_all(&self) -> bool {
        matches!(self, TreeFilter::All)
    }

    /// Conjoins two filters, collapsing the `All` sentinel.
    pub fn and(self, other: TreeFilter) -> TreeFilter {
        match (self, other) {
            (TreeFilter::All, f) | (f, TreeFilter::All) => f,
            (a, b) => TreeFilter::And(Box::new(a), Box::new(b)),
        }
    }

    /// Disjoins two filters, collapsing the `All` sentinel.
    pub fn or(self, other: TreeFilter) -> TreeFilter {
        match (self, other) {
            (TreeFilter::All, _) | (_, TreeFilter::All) => TreeFilter::All,
            (a, b) => TreeFilter::Or(Box::new(a), Box::new(b)),
        }
    }
}

impl fmt::Debug for TreeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeFilter::All => f.write_str("All"),
            TreeFilter::Path(p) => write!(f, "Path({})", String::from_utf8_lossy(&p.prefix)),
            TreeFilter::PathGroup(g) => write!(f, "PathGroup({} paths)", g.len()),
            TreeFilter::AnyDiff => f.write_str("AnyDiff"),
            TreeFilter::And(a, b) => write!(f, "And({a:?}, {b:?})"),
            TreeFilter::Or(a, b) => write!(f, "Or({a:?}, {b:?})"),
            TreeFilter::Not(inner) => write!(f, "Not({inner:?})"),
            TreeFilter::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// One precompiled path prefix.
#[derive(Clone)]
pub struct PathFilter {
    prefix: Vec<u8>,
}

impl PathFilter {
    fn new(path: &str) -> PathFilter {
        let trimmed = path.trim_matches('/');
        PathFilter {
            prefix: trimmed.as_bytes().to_vec(),
        }
    }

    fn test(&self, walk: &TreeWalk) -> Verdict {
        match walk.is_path_prefix(&self.prefix) {
            Ordering::Equal => Verdict::Include,
            Ordering::Less => Verdict::Exclude,
            Ordering::Greater => Verdict::Stop,
        }
    }
}

fn any_diff(walk: &TreeWalk) -> Verdict {
    let n = walk.tree_count();
    if n <= 1 {
        return Verdict::Include;
    }
    let base_mode = walk.raw_mode(0);
    for i in 1..n {
        if walk.raw_mode(i) != base_mode || !walk.id_equal(0, i) {
            return Verdict::Include;
        }
    }
    Verdict::Exclude
}
