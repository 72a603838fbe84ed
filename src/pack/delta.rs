//! Cache of inflated delta bases.

use std::sync::Arc;

use lru::LruCache;

use crate::model::ObjectKind;

/// Key: ordering hash of the owning pack plus the base's offset.
type Key = (u32, u64);

struct CachedBase {
    kind: ObjectKind,
    data: Arc<[u8]>,
}

/// A byte-bounded LRU of fully inflated delta-base payloads.
///
/// Kept separate from the window pool: windows hold compressed pack
/// spans, this cache holds the expensive-to-recompute inflated bases a
/// delta chain resolves against. Entries larger than the whole budget
/// are not admitted.
pub struct DeltaBaseCache {
    entries: LruCache<Key, CachedBase>,
    bytes: usize,
    limit: usize,
}

impl DeltaBaseCache {
    /// Creates a cache bounded at `limit` payload bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            bytes: 0,
            limit,
        }
    }

    /// Looks up the base at `(pack_hash, offset)`, refreshing its
    /// recency on hit.
    pub fn get(&mut self, pack_hash: u32, offset: u64) -> Option<(ObjectKind, Arc<[u8]>)> {
        self.entries
            .get(&(pack_hash, offset))
            .map(|e| (e.kind, Arc::clone(&e.data)))
    }

    /// Stores an inflated base, evicting least-recently-used entries
    /// until the byte budget holds.
    pub fn store(&mut self, pack_hash: u32, offset: u64, kind: ObjectKind, data: Arc<[u8]>) {
        if data.len() > self.limit {
            return;
        }
        let added = data.len();
        if let Some(old) = self.entries.put((pack_hash, offset), CachedBase { kind, data }) {
            self.bytes -= old.data.len();
        }
        self.bytes += added;
        self.evict_to_limit();
    }

    /// Applies a new byte budget immediately.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.evict_to_limit();
    }

    /// Drops every entry belonging to `pack_hash`.
    pub fn purge_pack(&mut self, pack_hash: u32) {
        let stale: Vec<Key> = self
            .entries
            .iter()
            .filter(|((h, _), _)| *h == pack_hash)
            .map(|(k, _)| *k)
            .collect();
        for key in stale {
            if let Some(old) = self.entries.pop(&key) {
                self.bytes -= old.data.len();
            }
        }
    }

    /// Current resident payload bytes.
    pub fn resident_bytes(&self) -> usize {
        self.bytes
    }

    /// Number of cached bases.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_to_limit(&mut self) {
        while self.bytes > self.limit {
            match self.entries.pop_lru() {
                Some((_, old)) => self.bytes -= old.data.len(),
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(n: usize) -> Arc<[u8]> {
        vec![0u8; n].into()
    }

    #[test]
    fn byte_budget_evicts_lru_first() {
        let mut cache = DeltaBaseCache::new(100);
        cache.store(1, 0, ObjectKind::Blob, base(40));
        cache.store(1, 8, ObjectKind::Blob, base(40));
        // Touch the first entry so the second becomes LRU.
        assert!(cache.get(1, 0).is_some());
        cache.store(1, 16, ObjectKind::Blob, base(40));
        assert!(cache.resident_bytes() <= 100);
        assert!(cache.get(1, 0).is_some());
        assert!(cache.get(1, 8).is_none());
        assert!(cache.get(1, 16).is_some());
    }

    #[test]
    fn oversized_entries_are_not_admitted() {
        let mut cache = DeltaBaseCache::new(16);
        cache.store(1, 0, ObjectKind::Blob, base(17));
        assert!(cache.is_empty());
        assert_eq!(cache.resident_bytes(), 0);
    }

    #[test]
    fn restore_same_key_replaces_bytes() {
        let mut cache = DeltaBaseCache::new(100);
        cache.store(1, 0, ObjectKind::Blob, base(60));
        cache.store(1, 0, ObjectKind::Tree, base(20));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.resident_bytes(), 20);
        let (kind, data) = cache.get(1, 0).expect("entry");
        assert_eq!(kind, ObjectKind::Tree);
        assert_eq!(data.len(), 20);
    }

    #[test]
    fn lowering_limit_prunes_immediately() {
        let mut cache = DeltaBaseCache::new(100);
        cache.store(1, 0, ObjectKind::Blob, base(30));
        cache.store(1, 8, ObjectKind::Blob, base(30));
        cache.store(1, 16, ObjectKind::Blob, base(30));
        cache.set_limit(40);
        assert!(cache.resident_bytes() <= 40);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn purge_pack_drops_only_that_pack() {
        let mut cache = DeltaBaseCache::new(1000);
        cache.store(1, 0, ObjectKind::Blob, base(10));
        cache.store(2, 0, ObjectKind::Blob, base(10));
        cache.purge_pack(1);
        assert!(cache.get(1, 0).is_none());
        assert!(cache.get(2, 0).is_some());
        assert_eq!(cache.resident_bytes(), 10);
    }
}
