//! Binary heap queue.

use log::warn;

use super::{QueueEntry, QueueStats, TimedQueue};

#[derive(Debug, Clone, Copy)]
struct Slot<O> {
    entry: QueueEntry<O>,
    seq: u64,
}

impl<O> Slot<O> {
    /// Heap order: earlier time first, then earlier insertion.
    fn before(&self, other: &Self) -> bool {
        (self.entry.time, self.seq) < (other.entry.time, other.seq)
    }
}

/// Min-heap on `(time, insertion sequence)`.
///
/// Removal and retiming locate the entry linearly and then restore the heap
/// property around it.
#[derive(Debug, Clone)]
pub struct HeapQueue<O> {
    heap: Vec<Slot<O>>,
    capacity: usize,
    overflow_reported: bool,
    next_seq: u64,
    stats: QueueStats,
}

impl<O: Copy + PartialEq> HeapQueue<O> {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
            capacity,
            overflow_reported: false,
            next_seq: 0,
            stats: QueueStats::default(),
        }
    }

    fn seq(&mut self) -> u64 {
        let s = self.next_seq;
        self.next_seq += 1;
        s
    }

    fn sift_up<const KEEP_STATS: bool>(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.heap[i].before(&self.heap[parent]) {
                break;
            }
            self.heap.swap(i, parent);
            i = parent;
            if KEEP_STATS {
                self.stats.sort_moves += 1;
            }
        }
    }

    fn sift_down<const KEEP_STATS: bool>(&mut self, mut i: usize) {
        let n = self.heap.len();
        loop {
            let l = 2 * i + 1;
            let r = l + 1;
            let mut m = i;
            if l < n && self.heap[l].before(&self.heap[m]) {
                m = l;
            }
            if r < n && self.heap[r].before(&self.heap[m]) {
                m = r;
            }
            if m == i {
                break;
            }
            self.heap.swap(i, m);
            i = m;
            if KEEP_STATS {
                self.stats.sort_moves += 1;
            }
        }
    }

    fn find(&self, object: &Option<O>) -> Option<usize> {
        self.heap.iter().position(|s| s.entry.same_object(object))
    }
}

impl<O: Copy + PartialEq> TimedQueue<O> for HeapQueue<O> {
    fn push<const KEEP_STATS: bool>(&mut self, entry: QueueEntry<O>) {
        let seq = self.seq();
        self.heap.push(Slot { entry, seq });
        if self.heap.len() > self.capacity && !self.overflow_reported {
            warn!("event queue exceeded its capacity of {} entries, growing", self.capacity);
            self.overflow_reported = true;
        }
        let last = self.heap.len() - 1;
        self.sift_up::<KEEP_STATS>(last);
        if KEEP_STATS {
            self.stats.calls += 1;
        }
    }

    fn pop(&mut self) -> QueueEntry<O> {
        if self.heap.is_empty() {
            return QueueEntry::sentinel();
        }
        let top = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.sift_down::<false>(0);
        }
        top.entry
    }

    fn top(&self) -> QueueEntry<O> {
        self.heap
            .first()
            .map(|s| s.entry)
            .unwrap_or_else(QueueEntry::sentinel)
    }

    fn remove<const KEEP_STATS: bool>(&mut self, object: Option<O>) -> bool {
        if KEEP_STATS {
            self.stats.removes += 1;
        }
        let Some(i) = self.find(&object) else {
            return false;
        };
        self.heap.swap_remove(i);
        if i < self.heap.len() {
            self.sift_down::<KEEP_STATS>(i);
            self.sift_up::<KEEP_STATS>(i);
        }
        true
    }

    fn retime<const KEEP_STATS: bool>(&mut self, entry: QueueEntry<O>) -> bool {
        if KEEP_STATS {
            self.stats.retimes += 1;
        }
        let Some(i) = self.find(&entry.object) else {
            return false;
        };
        let seq = self.seq();
        self.heap[i] = Slot { entry, seq };
        self.sift_down::<KEEP_STATS>(i);
        self.sift_up::<KEEP_STATS>(i);
        true
    }

    fn clear(&mut self) {
        self.heap.clear();
    }

    fn size(&self) -> usize {
        self.heap.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn stats(&self) -> &QueueStats {
        &self.stats
    }

    fn reset_stats(&mut self) {
        self.stats = QueueStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests as shared;

    #[test]
    fn test_ordering() {
        shared::check_ordering(HeapQueue::new(16));
    }

    #[test]
    fn test_fifo_same_time() {
        shared::check_fifo_same_time(HeapQueue::new(16));
    }

    #[test]
    fn test_remove() {
        shared::check_remove(HeapQueue::new(16));
    }

    #[test]
    fn test_retime() {
        shared::check_retime(HeapQueue::new(16));
    }

    #[test]
    fn test_empty_and_clear() {
        shared::check_empty_and_clear(HeapQueue::new(4));
    }
}
