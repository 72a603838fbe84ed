//! Object database access.
//!
//! The walkers consume objects through the [`ObjectDatabase`] trait:
//! whatever owns the loose/packed storage presents inflated object
//! payloads keyed by identity. [`MemoryObjectDatabase`] is a complete
//! in-process implementation, useful for tests and for assembling
//! synthetic histories.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::model::{ObjectId, ObjectKind};

/// One inflated object as handed out by an [`ObjectDatabase`].
#[derive(Debug, Clone)]
pub struct ObjectData {
    /// The object's kind.
    pub kind: ObjectKind,
    /// Fully inflated payload, header stripped.
    pub data: Arc<[u8]>,
}

impl ObjectData {
    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Read access to a store of inflated objects.
///
/// Implementations must be shareable across walkers; all methods take
/// `&self` and the trait requires `Send + Sync`.
pub trait ObjectDatabase: Send + Sync {
    /// Whether `id` names a stored object.
    fn has_object(&self, id: &ObjectId) -> bool;

    /// Opens the object named by `id`.
    ///
    /// Fails with [`Error::MissingObject`] when absent.
    fn open(&self, id: &ObjectId) -> Result<ObjectData>;

    /// Opens `id` and insists it is of `kind`.
    fn open_as(&self, id: &ObjectId, kind: ObjectKind) -> Result<ObjectData> {
        let obj = self.open(id)?;
        if obj.kind != kind {
            return Err(Error::IncorrectObjectType {
                id: *id,
                expected: kind,
            });
        }
        Ok(obj)
    }
}

/// A heap-backed object database.
///
/// Objects are inserted with explicit identifiers; the store does not
/// hash content itself. The typed insert helpers encode the canonical
/// tree and commit formats so synthetic repositories stay byte-exact
/// with what on-disk parsers expect.
#[derive(Default)]
pub struct MemoryObjectDatabase {
    objects: RwLock<FxHashMap<ObjectId, ObjectData>>,
}

impl MemoryObjectDatabase {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` as the payload of `id`, replacing any previous
    /// object with that identity.
    pub fn insert(&self, id: ObjectId, kind: ObjectKind, data: impl Into<Arc<[u8]>>) {
        self.objects.write().insert(
            id,
            ObjectData {
                kind,
                data: data.into(),
            },
        );
    }

    /// Encodes and stores a tree object.
    ///
    /// Entries are `(mode bits, name, id)` triples; they are sorted
    /// into canonical tree order before encoding, so callers may list
    /// them in any order.
    pub fn insert_tree(&self, id: ObjectId, entries: &[(u32, &str, ObjectId)]) {
        let mut sorted: Vec<&(u32, &str, ObjectId)> = entries.iter().collect();
        sorted.sort_by(|a, b| {
            crate::tree::entry_path_compare(a.1.as_bytes(), a.0, b.1.as_bytes(), b.0)
        });
        let mut raw = Vec::new();
        for (mode, name, entry_id) in sorted {
            raw.extend_from_slice(format!("{mode:o}").as_bytes());
            raw.push(b' ');
            raw.extend_from_slice(name.as_bytes());
            raw.push(0);
            raw.extend_from_slice(entry_id.as_bytes());
        }
        self.insert(id, ObjectKind::Tree, raw);
    }

    /// Encodes and stores a commit object.
    ///
    /// `when` is the committer timestamp in seconds since the epoch;
    /// the author line reuses it.
    pub fn insert_commit(
        &self,
        id: ObjectId,
        tree: ObjectId,
        parents: &[ObjectId],
        author: &str,
        when: i64,
        message: &str,
    ) {
        let mut raw = Vec::new();
        raw.extend_from_slice(format!("tree {tree}\n").as_bytes());
        for parent in parents {
            raw.extend_from_slice(format!("parent {parent}\n").as_bytes());
        }
        raw.extend_from_slice(format!("author {author} {when} +0000\n").as_bytes());
        raw.extend_from_slice(format!("committer {author} {when} +0000\n").as_bytes());
        raw.push(b'\n');
        raw.extend_from_slice(message.as_bytes());
        self.insert(id, ObjectKind::Commit, raw);
    }

    /// Stores a blob object.
    pub fn insert_blob(&self, id: ObjectId, data: &[u8]) {
        self.insert(id, ObjectKind::Blob, data.to_vec());
    }
}

impl ObjectDatabase for MemoryObjectDatabase {
    fn has_object(&self, id: &ObjectId) -> bool {
        self.objects.read().contains_key(id)
    }

    fn open(&self, id: &ObjectId) -> Result<ObjectData> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or(Error::MissingObject(*id))
    }
}
