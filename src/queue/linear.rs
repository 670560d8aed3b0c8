//! Array queue with insertion by adjacent swaps.

use log::warn;

use super::{QueueEntry, QueueStats, TimedQueue};
use crate::time::NetlistTime;

/// Linear time-ordered queue.
///
/// `list[0]` is a permanent sentinel at `never`. Real entries follow in
/// descending time order, so the earliest entry is the last element and
/// `pop` is a plain `Vec::pop`.
#[derive(Debug, Clone)]
pub struct LinearQueue<O> {
    list: Vec<QueueEntry<O>>,
    capacity: usize,
    overflow_reported: bool,
    stats: QueueStats,
}

impl<O: Copy + PartialEq> LinearQueue<O> {
    pub fn new(capacity: usize) -> Self {
        let mut list = Vec::with_capacity(capacity + 1);
        list.push(QueueEntry::sentinel());
        Self {
            list,
            capacity,
            overflow_reported: false,
            stats: QueueStats::default(),
        }
    }

    /// Queued entries, latest first. Mostly useful for diagnostics.
    pub fn entries(&self) -> &[QueueEntry<O>] {
        &self.list[1..]
    }

    fn note_growth(&mut self) {
        if self.list.len() > self.capacity + 1 && !self.overflow_reported {
            warn!(
                "event queue exceeded its capacity of {} entries, growing",
                self.capacity
            );
            self.overflow_reported = true;
        }
    }

    /// Move the entry at `i` to its place. Entries with equal time stay in
    /// front of it (they were scheduled first).
    fn settle<const KEEP_STATS: bool>(&mut self, mut i: usize) {
        let t = self.list[i].time;
        while i > 1 && self.list[i - 1].time <= t {
            self.list.swap(i - 1, i);
            i -= 1;
            if KEEP_STATS {
                self.stats.sort_moves += 1;
            }
        }
        while i + 1 < self.list.len() && self.list[i + 1].time > t {
            self.list.swap(i, i + 1);
            i += 1;
            if KEEP_STATS {
                self.stats.sort_moves += 1;
            }
        }
    }

    fn find(&self, object: &Option<O>) -> Option<usize> {
        (1..self.list.len())
            .rev()
            .find(|&i| self.list[i].same_object(object))
    }
}

impl<O: Copy + PartialEq> TimedQueue<O> for LinearQueue<O> {
    fn push<const KEEP_STATS: bool>(&mut self, entry: QueueEntry<O>) {
        debug_assert!(entry.time < NetlistTime::never());
        self.list.push(entry);
        self.note_growth();
        let mut i = self.list.len() - 1;
        while i > 1 && self.list[i - 1].time <= entry.time {
            self.list.swap(i - 1, i);
            i -= 1;
            if KEEP_STATS {
                self.stats.sort_moves += 1;
            }
        }
        if KEEP_STATS {
            self.stats.calls += 1;
        }
    }

    fn pop(&mut self) -> QueueEntry<O> {
        if self.list.len() > 1 {
            self.list.pop().unwrap_or_else(QueueEntry::sentinel)
        } else {
            self.list[0]
        }
    }

    fn top(&self) -> QueueEntry<O> {
        self.list[self.list.len() - 1]
    }

    fn remove<const KEEP_STATS: bool>(&mut self, object: Option<O>) -> bool {
        if KEEP_STATS {
            self.stats.removes += 1;
        }
        match self.find(&object) {
            Some(i) => {
                self.list.remove(i);
                true
            }
            None => false,
        }
    }

    fn retime<const KEEP_STATS: bool>(&mut self, entry: QueueEntry<O>) -> bool {
        if KEEP_STATS {
            self.stats.retimes += 1;
        }
        match self.find(&entry.object) {
            Some(i) => {
                self.list[i].time = entry.time;
                self.settle::<KEEP_STATS>(i);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.list.truncate(1);
    }

    fn size(&self) -> usize {
        self.list.len() - 1
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
        shared::check_ordering(LinearQueue::new(16));
    }

    #[test]
    fn test_fifo_same_time() {
        shared::check_fifo_same_time(LinearQueue::new(16));
    }

    #[test]
    fn test_remove() {
        shared::check_remove(LinearQueue::new(16));
    }

    #[test]
    fn test_retime() {
        shared::check_retime(LinearQueue::new(16));
    }

    #[test]
    fn test_empty_and_clear() {
        shared::check_empty_and_clear(LinearQueue::new(4));
    }

    #[test]
    fn test_sentinel_stays_at_slot_zero() {
        let mut q = LinearQueue::new(4);
        for i in 0..10u32 {
            q.emplace::<false>(NetlistTime::from_nsec(i64::from(i % 3)), Some(i));
        }
        assert!(q.list[0].exec_time().is_never());
        assert!(q.list[0].object().is_none());
        assert_eq!(q.capacity(), 4);
        assert_eq!(q.size(), 10);
        assert!(q.entries().windows(2).all(|w| w[0].exec_time() >= w[1].exec_time()));
    }

    #[test]
    fn test_stats_count_moves() {
        let mut q = LinearQueue::new(8);
        q.emplace::<true>(NetlistTime::from_nsec(1), Some(1u32));
        q.emplace::<true>(NetlistTime::from_nsec(2), Some(2));
        q.emplace::<true>(NetlistTime::from_nsec(3), Some(3));
        assert_eq!(q.stats().calls, 3);
        assert_eq!(q.stats().sort_moves, 3);

        q.emplace::<false>(NetlistTime::from_nsec(4), Some(4));
        assert_eq!(q.stats().calls, 3);
        q.reset_stats();
        assert_eq!(*q.stats(), QueueStats::default());
    }
}
