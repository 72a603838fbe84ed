//! The n-way tree walker.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::{FileMode, ObjectId, ObjectKind};
use crate::odb::ObjectDatabase;
use crate::tree::filter::{TreeFilter, Verdict};
use crate::tree::iter::{path_prefix_cmp, TreeIter};

/// Walks one or more trees in lockstep, synchronized on the minimum
/// path.
///
/// Each call to [`next`](TreeWalk::next) positions the walker on the
/// smallest path any tree still has to offer; per-tree accessors then
/// report that tree's contribution or a missing-entry sentinel. A
/// walker instance is single-threaded; run one walker per thread and
/// share only the object database between them.
pub struct TreeWalk {
    odb: Arc<dyn ObjectDatabase>,
    trees: Vec<TreeIter>,
    filter: TreeFilter,
    recursive: bool,
    post_order: bool,
    advance: bool,
    post_children: bool,
    done: bool,
    depth: usize,
    current_head: usize,
}

impl TreeWalk {
    /// Creates a walker with no trees and the accept-all filter.
    pub fn new(odb: Arc<dyn ObjectDatabase>) -> TreeWalk {
        TreeWalk {
            odb,
            trees: Vec::new(),
            filter: TreeFilter::All,
            recursive: false,
            post_order: false,
            advance: false,
            post_children: false,
            done: false,
            depth: 0,
            current_head: 0,
        }
    }

    /// Drops all trees and walk position, keeping filter and mode
    /// settings.
    pub fn reset(&mut self) {
        self.trees.clear();
        self.advance = false;
        self.post_children = false;
        self.done = false;
        self.depth = 0;
        self.current_head = 0;
    }

    /// Resets and adds one iterator per tree id.
    pub fn reset_trees(&mut self, ids: &[ObjectId]) -> Result<()> {
        self.reset();
        for id in ids {
            self.add_tree(*id)?;
        }
        Ok(())
    }

    /// Adds a canonical iterator over the tree named by `id`,
    /// returning its position among the walker's trees.
    pub fn add_tree(&mut self, id: ObjectId) -> Result<usize> {
        let obj = self.odb.open_as(&id, ObjectKind::Tree)?;
        self.add_iterator(TreeIter::canonical(obj.data, id)?)
    }

    /// Adds a prepared iterator (for example a directory-cache
    /// adapter), returning its position.
    pub fn add_iterator(&mut self, iter: TreeIter) -> Result<usize> {
        if self.depth != 0 || self.advance {
            return Err(Error::IllegalState("trees can only be added before walking"));
        }
        self.trees.push(iter);
        Ok(self.trees.len() - 1)
    }

    /// Number of trees being walked.
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Enables recursion into subtrees, suppressing the subtree
    /// entries themselves.
    pub fn set_recursive(&mut self, recursive: bool) {
        self.recursive = recursive;
    }

    /// In recursive mode, also delivers each subtree after its
    /// children (with [`is_post_children`](TreeWalk::is_post_children)
    /// reporting true).
    pub fn set_post_order(&mut self, post_order: bool) {
        self.post_order = post_order;
    }

    /// Installs the entry filter.
    pub fn set_filter(&mut self, filter: TreeFilter) {
        self.filter = filter;
    }

    /// Current recursion depth below the walk roots.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Advances to the next entry.
    ///
    /// Returns false at the end of the walk, or when the filter asked
    /// for a clean stop.
    pub fn next(&mut self) -> Result<bool> {
        if self.done || self.trees.is_empty() {
            return Ok(false);
        }
        if self.advance {
            self.advance = false;
            self.post_children = false;
            self.advance_matching_head()?;
        }

        loop {
            match self.min() {
                None => {
                    if self.depth > 0 {
                        self.exit_subtree();
                        if self.post_order {
                            self.advance = true;
                            self.post_children = true;
                            return Ok(true);
                        }
                        self.advance_matching_head()?;
                        continue;
                    }
                    return Ok(false);
                }
                Some(head) => {
                    self.current_head = head;
                    let filter = std::mem::replace(&mut self.filter, TreeFilter::All);
                    let verdict = filter.matches(self);
                    self.filter = filter;
                    match verdict? {
                        Verdict::Exclude => {
                            self.advance_matching_head()?;
                            continue;
                        }
                        Verdict::Stop => {
                            self.done = true;
                            return Ok(false);
                        }
                        Verdict::Include => {}
                    }
                    if self.recursive && FileMode::is_tree(self.trees[head].mode()) {
                        self.enter_subtree()?;
                        continue;
                    }
                    self.advance = true;
                    return Ok(true);
                }
            }
        }
    }

    /// Object id the `nth` tree records for the current path, or zero
    /// when that tree has no entry here.
    pub fn object_id(&self, nth: usize) -> ObjectId {
        let t = &self.trees[nth];
        if t.matches == Some(self.current_head) {
            t.entry_id()
        } else {
            ObjectId::ZERO
        }
    }

    /// Whether trees `a` and `b` record the same object for the
    /// current path. Two absent entries count as equal.
    pub fn id_equal(&self, a: usize, b: usize) -> bool {
        let head = self.current_head;
        let ta = &self.trees[a];
        let tb = &self.trees[b];
        match (ta.matches == Some(head), tb.matches == Some(head)) {
            (true, true) => ta.entry_id() == tb.entry_id(),
            (false, false) => true,
            _ => false,
        }
    }

    /// Raw mode bits the `nth` tree records for the current path, or
    /// zero when absent.
    pub fn raw_mode(&self, nth: usize) -> u32 {
        let t = &self.trees[nth];
        if t.matches == Some(self.current_head) {
            t.mode()
        } else {
            0
        }
    }

    /// Interpreted mode of the `nth` tree's entry.
    pub fn file_mode(&self, nth: usize) -> FileMode {
        FileMode::from_bits(self.raw_mode(nth))
    }

    /// Raw bytes of the current path.
    pub fn raw_path(&self) -> &[u8] {
        self.trees[self.current_head].path_bytes()
    }

    /// Current path as a string, lossily decoded.
    pub fn path_string(&self) -> String {
        String::from_utf8_lossy(self.raw_path()).into_owned()
    }

    /// Last component of the current path as a string.
    pub fn name_string(&self) -> String {
        String::from_utf8_lossy(self.trees[self.current_head].name_bytes()).into_owned()
    }

    /// Whether the current entry is a subtree.
    pub fn is_subtree(&self) -> bool {
        FileMode::is_tree(self.trees[self.current_head].mode())
    }

    /// Whether the current entry is a subtree being delivered after
    /// its children (post-order mode only).
    pub fn is_post_children(&self) -> bool {
        self.post_children
    }

    /// Compares the current path against a candidate prefix: `Less`
    /// while the walk is still before the prefix, `Equal` when the
    /// prefix matches exactly or at a directory boundary, `Greater`
    /// once the walk has passed it for good.
    pub fn is_path_prefix(&self, prefix: &[u8]) -> Ordering {
        let t = &self.trees[self.current_head];
        path_prefix_cmp(t.path_bytes(), t.mode(), prefix)
    }

    /// Descends into the current subtree entry.
    ///
    /// Every iterator is replaced at once: trees contributing the
    /// current path by their child iterator, all others by an empty
    /// sentinel. The replaced iterators are retained and restored when
    /// the subtree is exhausted.
    pub fn enter_subtree(&mut self) -> Result<()> {
        let head = self.current_head;
        let mut children: Vec<Option<TreeIter>> = Vec::with_capacity(self.trees.len());
        for t in &self.trees {
            let contributes =
                t.matches == Some(head) && !t.eof() && FileMode::is_tree(t.mode());
            if contributes {
                children.push(Some(t.make_subtree_iterator(self.odb.as_ref())?));
            } else {
                children.push(None);
            }
        }
        for (slot, child) in children.into_iter().enumerate() {
            let old = std::mem::replace(&mut self.trees[slot], TreeIter::empty());
            self.trees[slot] = match child {
                Some(mut c) => {
                    c.set_parent(old);
                    c
                }
                None => TreeIter::empty_with_parent(old),
            };
        }
        self.depth += 1;
        self.advance = false;
        Ok(())
    }

    /// Finds the smallest current path, tagging every tree that ties
    /// with it. Returns None when all iterators are exhausted.
    fn min(&mut self) -> Option<usize> {
        let mut min_idx: Option<usize> = None;
        for i in 0..self.trees.len() {
            if self.trees[i].eof() {
                continue;
            }
            match min_idx {
                None => {
                    self.trees[i].matches = Some(i);
                    min_idx = Some(i);
                }
                Some(m) => {
                    let (left, right) = self.trees.split_at(i);
                    match right[0].path_compare(&left[m]) {
                        Ordering::Less => {
                            self.trees[i].matches = Some(i);
                            min_idx = Some(i);
                        }
                        Ordering::Equal => self.trees[i].matches = Some(m),
                        Ordering::Greater => {}
                    }
                }
            }
        }
        min_idx
    }

    /// Advances every tree tagged with the current head, clearing the
    /// tags.
    fn advance_matching_head(&mut self) -> Result<()> {
        let head = self.current_head;
        for t in &mut self.trees {
            if t.matches == Some(head) {
                t.advance_entry()?;
                t.matches = None;
            }
        }
        Ok(())
    }

    /// Pops every iterator back to its parent and recomputes the head
    /// from the self-tags left behind by the terminal `min` pass.
    fn exit_subtree(&mut self) {
        self.depth -= 1;
        for slot in 0..self.trees.len() {
            let child = std::mem::replace(&mut self.trees[slot], TreeIter::empty());
            self.trees[slot] = child
                .into_parent()
                .expect("positive depth implies a parent iterator");
        }
        let mut min_idx: Option<usize> = None;
        for i in 0..self.trees.len() {
            if self.trees[i].matches != Some(i) {
                continue;
            }
            match min_idx {
                None => min_idx = Some(i),
                Some(m) => {
                    let (left, right) = self.trees.split_at(i);
                    if right[0].path_compare(&left[m]) == Ordering::Less {
                        min_idx = Some(i);
                    }
                }
            }
        }
        self.current_head = min_idx.unwrap_or(0);
    }
}
