//! Pending-commit queues.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use super::commit::{CommitIx, CommitPool};

/// Heap entry ordered by commit time descending, insertion order on
/// ties.
struct DateEntry {
    time: i64,
    seq: u64,
    ix: CommitIx,
}

impl PartialEq for DateEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DateEntry {}

impl PartialOrd for DateEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DateEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: newer commits first, then first-inserted first.
        self.time
            .cmp(&other.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A max-heap of commits keyed on commit time.
#[derive(Default)]
pub(crate) struct DateQueue {
    heap: BinaryHeap<DateEntry>,
    next_seq: u64,
}

impl DateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ix: CommitIx, pool: &CommitPool) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(DateEntry {
            time: pool.node(ix).commit_time,
            seq,
            ix,
        });
    }

    pub fn pop(&mut self) -> Option<CommitIx> {
        self.heap.pop().map(|e| e.ix)
    }

    pub fn everybody_has(&self, pool: &CommitPool, flag: u32) -> bool {
        self.heap.iter().all(|e| pool.node(e.ix).has(flag))
    }
}

/// The queue feeding the pending generator: first-in-first-out for
/// start-order walks, date-ordered otherwise.
pub(crate) enum PendingQueue {
    Fifo(VecDeque<CommitIx>),
    Date(DateQueue),
}

impl PendingQueue {
    pub fn fifo<I: IntoIterator<Item = CommitIx>>(starts: I) -> Self {
        PendingQueue::Fifo(starts.into_iter().collect())
    }

    pub fn date<I: IntoIterator<Item = CommitIx>>(starts: I, pool: &CommitPool) -> Self {
        let mut q = DateQueue::new();
        for ix in starts {
            q.add(ix, pool);
        }
        PendingQueue::Date(q)
    }

    pub fn add(&mut self, ix: CommitIx, pool: &CommitPool) {
        match self {
            PendingQueue::Fifo(q) => q.push_back(ix),
            PendingQueue::Date(q) => q.add(ix, pool),
        }
    }

    pub fn pop(&mut self) -> Option<CommitIx> {
        match self {
            PendingQueue::Fifo(q) => q.pop_front(),
            PendingQueue::Date(q) => q.pop(),
        }
    }

    pub fn everybody_has(&self, pool: &CommitPool, flag: u32) -> bool {
        match self {
            PendingQueue::Fifo(q) => q.iter().all(|&ix| pool.node(ix).has(flag)),
            PendingQueue::Date(q) => q.everybody_has(pool, flag),
        }
    }

    pub fn is_date_ordered(&self) -> bool {
        matches!(self, PendingQueue::Date(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectId;
    use crate::odb::MemoryObjectDatabase;
    use std::sync::Arc;

    fn oid(n: u8) -> ObjectId {
        let mut raw = [0u8; 20];
        raw[19] = n;
        ObjectId::from_bytes(raw)
    }

    fn pool_with_times(times: &[i64]) -> (CommitPool, Vec<CommitIx>) {
        let odb = MemoryObjectDatabase::new();
        for (i, t) in times.iter().enumerate() {
            odb.insert_commit(oid(i as u8 + 1), oid(100), &[], "A <a@b>", *t, "m");
        }
        let mut pool = CommitPool::new(Arc::new(odb));
        let ixs = (0..times.len())
            .map(|i| {
                let ix = pool.lookup(oid(i as u8 + 1));
                pool.parse_headers(ix).expect("parse");
                ix
            })
            .collect();
        (pool, ixs)
    }

    #[test]
    fn date_queue_pops_newest_first() {
        let (pool, ixs) = pool_with_times(&[5, 9, 1, 7]);
        let mut q = DateQueue::new();
        for &ix in &ixs {
            q.add(ix, &pool);
        }
        let order: Vec<i64> = std::iter::from_fn(|| q.pop())
            .map(|ix| pool.node(ix).commit_time)
            .collect();
        assert_eq!(order, vec![9, 7, 5, 1]);
    }

    #[test]
    fn date_queue_keeps_insertion_order_on_ties() {
        let (pool, ixs) = pool_with_times(&[4, 4, 4]);
        let mut q = DateQueue::new();
        for &ix in &ixs {
            q.add(ix, &pool);
        }
        let order: Vec<CommitIx> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(order, ixs);
    }

    #[test]
    fn fifo_preserves_input_order() {
        let (pool, ixs) = pool_with_times(&[3, 1, 2]);
        let mut q = PendingQueue::fifo(ixs.clone());
        q.add(ixs[0], &pool);
        let mut order = Vec::new();
        while let Some(ix) = q.pop() {
            order.push(ix);
        }
        assert_eq!(order, vec![ixs[0], ixs[1], ixs[2], ixs[0]]);
    }
}
