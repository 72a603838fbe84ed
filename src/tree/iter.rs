//! Tree-entry iterators.
//!
//! A [`TreeIter`] is an ordered cursor over the `(mode, name, id)`
//! triples of one tree. The walker drives N of them in lockstep;
//! entering a subtree replaces every iterator with either a child
//! cursor or an empty sentinel, each owning the iterator it shadows so
//! the exit path can restore it.

use std::cmp::Ordering;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::dircache::DirCache;
use crate::error::{Error, Result};
use crate::model::{parse_octal_mode, FileMode, ObjectId, ObjectKind, MODE_TREE, OBJECT_ID_LENGTH};
use crate::odb::ObjectDatabase;

/// Compares two entry paths in canonical tree order.
///
/// Directory entries compare as if a `/` were appended to their name,
/// which is how the on-disk format makes every iterator agree on the
/// global order.
pub(crate) fn entry_path_compare(a: &[u8], a_mode: u32, b: &[u8], b_mode: u32) -> Ordering {
    let common = a.len().min(b.len());
    for i in 0..common {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    let a_last = if a.len() > common {
        a[common]
    } else {
        last_path_char(a_mode)
    };
    let b_last = if b.len() > common {
        b[common]
    } else {
        last_path_char(b_mode)
    };
    a_last.cmp(&b_last)
}

fn last_path_char(mode: u32) -> u8 {
    if FileMode::is_tree(mode) {
        b'/'
    } else {
        0
    }
}

/// Compares the current path of an iterator against a candidate
/// prefix.
///
/// `Less`: the path still sorts before the prefix. `Equal`: the prefix
/// matches, exactly or at a directory boundary (either side may be the
/// ancestor). `Greater`: the walk has passed the prefix for good.
pub(crate) fn path_prefix_cmp(path: &[u8], mode: u32, prefix: &[u8]) -> Ordering {
    let common = path.len().min(prefix.len());
    for i in 0..common {
        match path[i].cmp(&prefix[i]) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    if path.len() == prefix.len() {
        return Ordering::Equal;
    }
    if path.len() < prefix.len() {
        // The current entry could be a parent directory of the prefix.
        if FileMode::is_tree(mode) && prefix[common] == b'/' {
            return Ordering::Equal;
        }
        return last_path_char(mode).cmp(&prefix[common]);
    }
    // The current entry could live under the prefix directory.
    if path[common] == b'/' {
        return Ordering::Equal;
    }
    path[common].cmp(&b'/')
}

struct ParsedEntry {
    mode: u32,
    name: SmallVec<[u8; 32]>,
    id: ObjectId,
}

#[derive(Debug)]
struct CanonicalState {
    raw: Arc<[u8]>,
    tree_id: ObjectId,
    ptr: usize,
    next_ptr: usize,
}

#[derive(Debug)]
struct DirCacheState {
    cache: Arc<DirCache>,
    /// Child indices navigating the cache tree to this level.
    tree_path: Vec<usize>,
    ptr: usize,
    end: usize,
    /// Flat-path byte length of this level's directory prefix.
    prefix_len: usize,
    /// Flat entries covered by the current position.
    span: usize,
    /// Set when the current entry is a synthesized subtree.
    current_child: Option<usize>,
}

#[derive(Debug)]
enum IterKind {
    Empty,
    Canonical(CanonicalState),
    DirCache(DirCacheState),
}

/// An ordered cursor over one tree's entries.
#[derive(Debug)]
pub struct TreeIter {
    kind: IterKind,
    parent: Option<Box<TreeIter>>,
    /// Full path bytes from the walk root; `[0, path_offset)` is the
    /// parent directory prefix including its trailing `/`.
    path: Vec<u8>,
    path_offset: usize,
    path_len: usize,
    mode: u32,
    entry_id: ObjectId,
    eof: bool,
    /// Walker-owned tag: index of the head iterator this one currently
    /// agrees with, set and cleared during the n-way merge.
    pub(crate) matches: Option<usize>,
}

impl TreeIter {
    /// An iterator over a canonical tree object's raw payload.
    pub fn canonical(raw: Arc<[u8]>, tree_id: ObjectId) -> Result<TreeIter> {
        Self::canonical_with_prefix(raw, tree_id, Vec::new())
    }

    fn canonical_with_prefix(raw: Arc<[u8]>, tree_id: ObjectId, prefix: Vec<u8>) -> Result<TreeIter> {
        let path_offset = prefix.len();
        let mut iter = TreeIter {
            kind: IterKind::Canonical(CanonicalState {
                raw,
                tree_id,
                ptr: 0,
                next_ptr: 0,
            }),
            parent: None,
            path: prefix,
            path_offset,
            path_len: path_offset,
            mode: 0,
            entry_id: ObjectId::ZERO,
            eof: true,
            matches: None,
        };
        iter.parse_current()?;
        Ok(iter)
    }

    /// The sentinel iterator: at end of input from construction.
    pub fn empty() -> TreeIter {
        TreeIter {
            kind: IterKind::Empty,
            parent: None,
            path: Vec::new(),
            path_offset: 0,
            path_len: 0,
            mode: 0,
            entry_id: ObjectId::ZERO,
            eof: true,
            matches: None,
        }
    }

    pub(crate) fn empty_with_parent(parent: TreeIter) -> TreeIter {
        let mut iter = TreeIter::empty();
        iter.parent = Some(Box::new(parent));
        iter
    }

    /// An iterator presenting a flat directory cache as a hierarchy.
    pub fn dir_cache(cache: Arc<DirCache>) -> Result<TreeIter> {
        let end = cache.entry_count();
        let mut iter = TreeIter {
            kind: IterKind::DirCache(DirCacheState {
                cache,
                tree_path: Vec::new(),
                ptr: 0,
                end,
                prefix_len: 0,
                span: 0,
                current_child: None,
            }),
            parent: None,
            path: Vec::new(),
            path_offset: 0,
            path_len: 0,
            mode: 0,
            entry_id: ObjectId::ZERO,
            eof: true,
            matches: None,
        };
        iter.parse_current()?;
        Ok(iter)
    }

    /// Whether the iterator has run out of entries.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Raw mode bits of the current entry.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Object id of the current entry.
    pub fn entry_id(&self) -> ObjectId {
        self.entry_id
    }

    /// Full path bytes of the current entry.
    pub fn path_bytes(&self) -> &[u8] {
        &self.path[..self.path_len]
    }

    /// Name bytes of the current entry (the last path component).
    pub fn name_bytes(&self) -> &[u8] {
        &self.path[self.path_offset..self.path_len]
    }

    pub(crate) fn path_compare(&self, other: &TreeIter) -> Ordering {
        entry_path_compare(self.path_bytes(), self.mode, other.path_bytes(), other.mode)
    }

    /// Steps to the next entry. For a synthesized directory-cache
    /// subtree this hops over the whole subtree span.
    pub(crate) fn advance_entry(&mut self) -> Result<()> {
        match &mut self.kind {
            IterKind::Empty => return Ok(()),
            IterKind::Canonical(st) => st.ptr = st.next_ptr,
            IterKind::DirCache(st) => st.ptr += st.span,
        }
        self.parse_current()
    }

    /// Builds the child iterator for the current subtree entry,
    /// without linking a parent yet (the walker attaches it once every
    /// slot's child has been created).
    pub(crate) fn make_subtree_iterator(&self, odb: &dyn ObjectDatabase) -> Result<TreeIter> {
        match &self.kind {
            IterKind::Empty => Err(Error::IllegalState(
                "cannot enter a subtree of the empty iterator",
            )),
            IterKind::Canonical(_) => {
                let obj = odb.open_as(&self.entry_id, ObjectKind::Tree)?;
                let mut prefix = self.path_bytes().to_vec();
                prefix.push(b'/');
                Self::canonical_with_prefix(obj.data, self.entry_id, prefix)
            }
            IterKind::DirCache(st) => {
                let child_ix = st.current_child.ok_or(Error::IllegalState(
                    "current directory cache entry is not a subtree",
                ))?;
                let mut tree_path = st.tree_path.clone();
                tree_path.push(child_ix);
                let mut prefix = self.path_bytes().to_vec();
                prefix.push(b'/');
                let prefix_len = prefix.len();
                let span = st.span;
                let mut iter = TreeIter {
                    kind: IterKind::DirCache(DirCacheState {
                        cache: Arc::clone(&st.cache),
                        tree_path,
                        ptr: st.ptr,
                        end: st.ptr + span,
                        prefix_len,
                        span: 0,
                        current_child: None,
                    }),
                    parent: None,
                    path: prefix,
                    path_offset: prefix_len,
                    path_len: prefix_len,
                    mode: 0,
                    entry_id: ObjectId::ZERO,
                    eof: true,
                    matches: None,
                };
                iter.parse_current()?;
                Ok(iter)
            }
        }
    }

    pub(crate) fn set_parent(&mut self, parent: TreeIter) {
        self.parent = Some(Box::new(parent));
    }

    pub(crate) fn into_parent(self) -> Option<TreeIter> {
        self.parent.map(|p| *p)
    }

    fn parse_current(&mut self) -> Result<()> {
        let parsed = match &mut self.kind {
            IterKind::Empty => None,
            IterKind::Canonical(st) => parse_canonical(st)?,
            IterKind::DirCache(st) => parse_dircache(st)?,
        };
        match parsed {
            None => {
                self.eof = true;
                self.path_len = self.path_offset;
                self.mode = 0;
                self.entry_id = ObjectId::ZERO;
            }
            Some(entry) => {
                self.path.truncate(self.path_offset);
                self.path.extend_from_slice(&entry.name);
                self.path_len = self.path_offset + entry.name.len();
                self.mode = entry.mode;
                self.entry_id = entry.id;
                self.eof = false;
            }
        }
        Ok(())
    }
}

fn parse_canonical(st: &mut CanonicalState) -> Result<Option<ParsedEntry>> {
    if st.ptr >= st.raw.len() {
        return Ok(None);
    }
    let raw = &st.raw;
    let (mode, name_start) = parse_octal_mode(raw, st.ptr).ok_or_else(|| {
        Error::corrupt_object(st.tree_id, format!("bad mode at offset {}", st.ptr))
    })?;
    let nul = raw[name_start..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| name_start + p)
        .ok_or_else(|| {
            Error::corrupt_object(st.tree_id, format!("unterminated name at offset {name_start}"))
        })?;
    if nul == name_start {
        return Err(Error::corrupt_object(
            st.tree_id,
            format!("empty entry name at offset {name_start}"),
        ));
    }
    let name = &raw[name_start..nul];
    if name.contains(&b'/') {
        return Err(Error::corrupt_object(
            st.tree_id,
            format!("entry name contains '/' at offset {name_start}"),
        ));
    }
    let id = ObjectId::from_slice(raw, nul + 1)
        .map_err(|_| Error::corrupt_object(st.tree_id, format!("truncated id at offset {nul}")))?;
    st.next_ptr = nul + 1 + OBJECT_ID_LENGTH;
    Ok(Some(ParsedEntry {
        mode,
        name: SmallVec::from_slice(name),
        id,
    }))
}

fn parse_dircache(st: &mut DirCacheState) -> Result<Option<ParsedEntry>> {
    if st.ptr >= st.end {
        st.span = 0;
        st.current_child = None;
        return Ok(None);
    }
    let entry = st.cache.entry(st.ptr);
    let rest = &entry.path()[st.prefix_len..];
    match rest.iter().position(|&b| b == b'/') {
        None => {
            st.span = 1;
            st.current_child = None;
            Ok(Some(ParsedEntry {
                mode: entry.mode(),
                name: SmallVec::from_slice(rest),
                id: entry.id(),
            }))
        }
        Some(slash) => {
            let component = &rest[..slash];
            let node = st
                .cache
                .tree_at(&st.tree_path)
                .ok_or_else(|| Error::Corrupt("directory cache tree out of sync".into()))?;
            let child_ix = node
                .children()
                .iter()
                .position(|c| c.name() == component)
                .ok_or_else(|| Error::Corrupt("directory cache tree out of sync".into()))?;
            let child = &node.children()[child_ix];
            st.span = child.entry_span();
            st.current_child = Some(child_ix);
            Ok(Some(ParsedEntry {
                mode: MODE_TREE,
                name: SmallVec::from_slice(component),
                id: child.object_id(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MODE_EXECUTABLE, MODE_FILE};
    use crate::odb::MemoryObjectDatabase;

    fn oid(n: u8) -> ObjectId {
        let mut raw = [0u8; 20];
        raw[19] = n;
        ObjectId::from_bytes(raw)
    }

    fn canonical_fixture(entries: &[(u32, &str, ObjectId)]) -> TreeIter {
        let odb = MemoryObjectDatabase::new();
        odb.insert_tree(oid(200), entries);
        let obj = odb.open(&oid(200)).expect("tree");
        TreeIter::canonical(obj.data, oid(200)).expect("parse")
    }

    #[test]
    fn canonical_iterates_records_in_order() {
        let mut iter = canonical_fixture(&[
            (MODE_FILE, "b", oid(2)),
            (MODE_FILE, "a", oid(1)),
            (MODE_EXECUTABLE, "c", oid(3)),
        ]);
        assert!(!iter.eof());
        assert_eq!(iter.name_bytes(), b"a");
        assert_eq!(iter.entry_id(), oid(1));
        iter.advance_entry().expect("advance");
        assert_eq!(iter.name_bytes(), b"b");
        iter.advance_entry().expect("advance");
        assert_eq!(iter.name_bytes(), b"c");
        assert_eq!(iter.mode(), MODE_EXECUTABLE);
        iter.advance_entry().expect("advance");
        assert!(iter.eof());
    }

    #[test]
    fn empty_payload_is_eof_at_once() {
        let raw: Arc<[u8]> = Vec::new().into();
        let iter = TreeIter::canonical(raw, oid(1)).expect("parse");
        assert!(iter.eof());
    }

    #[test]
    fn truncated_id_is_corrupt() {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"100644 a\0");
        raw.extend_from_slice(&[0u8; 7]);
        let raw: Arc<[u8]> = raw.into();
        match TreeIter::canonical(raw, oid(5)) {
            Err(Error::CorruptObject { id, .. }) => assert_eq!(id, oid(5)),
            other => panic!("expected CorruptObject, got {other:?}"),
        }
    }

    #[test]
    fn bad_mode_is_corrupt() {
        let raw: Arc<[u8]> = b"10x644 a\0aaaaaaaaaaaaaaaaaaaa".to_vec().into();
        assert!(matches!(
            TreeIter::canonical(raw, oid(5)),
            Err(Error::CorruptObject { .. })
        ));
    }

    #[test]
    fn slash_in_name_is_corrupt() {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"100644 a/b\0");
        raw.extend_from_slice(&[1u8; 20]);
        let raw: Arc<[u8]> = raw.into();
        assert!(matches!(
            TreeIter::canonical(raw, oid(5)),
            Err(Error::CorruptObject { .. })
        ));
    }

    #[test]
    fn tree_order_places_directories_with_virtual_slash() {
        assert_eq!(
            entry_path_compare(b"a.x", MODE_FILE, b"a", MODE_TREE),
            Ordering::Less
        );
        assert_eq!(
            entry_path_compare(b"a0", MODE_FILE, b"a", MODE_TREE),
            Ordering::Greater
        );
        assert_eq!(
            entry_path_compare(b"a", MODE_FILE, b"a", MODE_TREE),
            Ordering::Less
        );
        assert_eq!(
            entry_path_compare(b"d/x", MODE_FILE, b"d/x", MODE_FILE),
            Ordering::Equal
        );
    }

    #[test]
    fn prefix_compare_recognizes_both_containment_directions() {
        assert_eq!(path_prefix_cmp(b"a", MODE_TREE, b"a/b"), Ordering::Equal);
        assert_eq!(path_prefix_cmp(b"a/b/c", MODE_FILE, b"a/b"), Ordering::Equal);
        assert_eq!(path_prefix_cmp(b"a", MODE_FILE, b"a"), Ordering::Equal);
        assert_eq!(path_prefix_cmp(b"a", MODE_FILE, b"b"), Ordering::Less);
        assert_eq!(path_prefix_cmp(b"c", MODE_FILE, b"b"), Ordering::Greater);
        // A plain file cannot be a parent directory of the prefix.
        assert_eq!(path_prefix_cmp(b"a", MODE_FILE, b"a/b"), Ordering::Less);
        // "a0" sorts after everything under "a/".
        assert_eq!(path_prefix_cmp(b"a0", MODE_FILE, b"a"), Ordering::Greater);
    }

    #[test]
    fn dircache_iterator_synthesizes_subtrees() {
        let mut b = DirCache::builder();
        b.add("a", MODE_FILE, 0, oid(1)).expect("add");
        b.add("d/x", MODE_FILE, 0, oid(2)).expect("add");
        b.add("d/y", MODE_FILE, 0, oid(3)).expect("add");
        b.add("e", MODE_FILE, 0, oid(4)).expect("add");
        b.tree_id("d", oid(9));
        let cache = Arc::new(b.finish().expect("finish"));

        let mut iter = TreeIter::dir_cache(Arc::clone(&cache)).expect("iter");
        assert_eq!(iter.name_bytes(), b"a");
        iter.advance_entry().expect("advance");
        assert_eq!(iter.name_bytes(), b"d");
        assert_eq!(iter.mode(), MODE_TREE);
        assert_eq!(iter.entry_id(), oid(9));

        let odb = MemoryObjectDatabase::new();
        let mut child = iter.make_subtree_iterator(&odb).expect("child");
        assert_eq!(child.path_bytes(), b"d/x");
        child.advance_entry().expect("advance");
        assert_eq!(child.path_bytes(), b"d/y");
        child.advance_entry().expect("advance");
        assert!(child.eof());

        // The parent hops the whole span in one step.
        iter.advance_entry().expect("advance");
        assert_eq!(iter.name_bytes(), b"e");
        iter.advance_entry().expect("advance");
        assert!(iter.eof());
    }

    #[test]
    fn dircache_invalid_subtree_has_zero_id() {
        let mut b = DirCache::builder();
        b.add("d/x", MODE_FILE, 0, oid(2)).expect("add");
        let cache = Arc::new(b.finish().expect("finish"));
        let iter = TreeIter::dir_cache(cache).expect("iter");
        assert_eq!(iter.name_bytes(), b"d");
        assert_eq!(iter.entry_id(), ObjectId::ZERO);
        assert_eq!(iter.mode(), MODE_TREE);
    }
}
