//! Time-ordered event queues.
//!
//! The kernel keeps every pending net update in one queue ordered by time.
//! Two implementations share the [`TimedQueue`] interface:
//!
//! - [`LinearQueue`] keeps a descending array and bubbles new entries in from
//!   the tail. Real circuits mostly schedule close to the last insertion, so
//!   this is O(1) on average.
//! - [`HeapQueue`] is a binary min-heap with O(log n) insert and pop.
//!
//! The kernel picks one at build time through the `heap-queue` feature.
//!
//! Entries with the same time are delivered in insertion order (FIFO) in
//! both variants.
//!
//! Profiling is selected per call through the `KEEP_STATS` const parameter,
//! so the counting code is compiled out of the plain path.

mod heap;
mod linear;

pub use heap::HeapQueue;
pub use linear::LinearQueue;

use crate::time::NetlistTime;

/// Default capacity of the kernel queue.
pub const DEFAULT_QUEUE_SIZE: usize = 512;

/// A scheduled `(time, object)` pair.
///
/// Ordering uses the time only. Identity (used by `remove` and `retime`)
/// uses the object only.
#[derive(Debug, Clone, Copy)]
pub struct QueueEntry<O> {
    time: NetlistTime,
    object: Option<O>,
}

impl<O: Copy + PartialEq> QueueEntry<O> {
    pub fn new(time: NetlistTime, object: Option<O>) -> Self {
        Self { time, object }
    }

    /// The entry that permanently sits below all real entries.
    pub fn sentinel() -> Self {
        Self {
            time: NetlistTime::never(),
            object: None,
        }
    }

    pub fn exec_time(&self) -> NetlistTime {
        self.time
    }

    pub fn object(&self) -> Option<O> {
        self.object
    }

    /// Identity comparison, ignoring time.
    pub fn same_object(&self, other: &Option<O>) -> bool {
        self.object == *other
    }
}

/// Profiling counters, only updated on `KEEP_STATS = true` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Adjacent swaps during insertion and retiming
    pub sort_moves: u64,
    /// Insertions
    pub calls: u64,
    /// Removals by identity
    pub removes: u64,
    /// Retimes by identity
    pub retimes: u64,
}

/// Common interface for the event queues.
pub trait TimedQueue<O: Copy + PartialEq> {
    /// Insert an entry keeping time order.
    fn push<const KEEP_STATS: bool>(&mut self, entry: QueueEntry<O>);

    /// Remove and return the earliest entry. Returns the sentinel if empty.
    fn pop(&mut self) -> QueueEntry<O>;

    /// Earliest entry without removing it. Returns the sentinel if empty.
    fn top(&self) -> QueueEntry<O>;

    /// Remove the entry for `object`. Returns whether one was found.
    fn remove<const KEEP_STATS: bool>(&mut self, object: Option<O>) -> bool;

    /// Give the entry for `entry.object()` the new time of `entry`.
    /// Returns whether one was found.
    fn retime<const KEEP_STATS: bool>(&mut self, entry: QueueEntry<O>) -> bool;

    fn clear(&mut self);

    /// Number of queued entries (the sentinel is not counted).
    fn size(&self) -> usize;

    fn capacity(&self) -> usize;

    fn stats(&self) -> &QueueStats;

    fn reset_stats(&mut self);

    fn emplace<const KEEP_STATS: bool>(&mut self, time: NetlistTime, object: Option<O>) {
        self.push::<KEEP_STATS>(QueueEntry::new(time, object));
    }

    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Drain a queue, returning (time in ns, object) pairs.
    pub(crate) fn drain<Q: TimedQueue<u32>>(q: &mut Q) -> Vec<(i64, u32)> {
        let mut out = Vec::new();
        while !q.is_empty() {
            let e = q.pop();
            out.push((e.exec_time().as_raw() / 10, e.object().unwrap_or(u32::MAX)));
        }
        out
    }

    /// Shared behaviour checks run against both queue variants.
    pub(crate) fn check_ordering<Q: TimedQueue<u32>>(mut q: Q) {
        let times = [50, 10, 30, 10, 70, 20, 60, 5, 40, 30];
        for (i, t) in times.iter().enumerate() {
            q.emplace::<false>(NetlistTime::from_nsec(*t), Some(i as u32));
        }
        assert_eq!(q.size(), times.len());
        assert_eq!(q.top().exec_time(), NetlistTime::from_nsec(5));

        let drained = drain(&mut q);
        let mut sorted: Vec<i64> = times.to_vec();
        sorted.sort_unstable();
        let got: Vec<i64> = drained.iter().map(|(t, _)| *t).collect();
        assert_eq!(got, sorted);
    }

    pub(crate) fn check_fifo_same_time<Q: TimedQueue<u32>>(mut q: Q) {
        let t = NetlistTime::from_nsec(100);
        q.emplace::<false>(NetlistTime::from_nsec(200), Some(99));
        for i in 0..5 {
            q.emplace::<false>(t, Some(i));
        }
        let objs: Vec<u32> = drain(&mut q).into_iter().map(|(_, o)| o).collect();
        assert_eq!(objs, vec![0, 1, 2, 3, 4, 99]);
    }

    pub(crate) fn check_remove<Q: TimedQueue<u32>>(mut q: Q) {
        for i in 0..8u32 {
            q.emplace::<true>(NetlistTime::from_nsec(i64::from(10 * (8 - i))), Some(i));
        }
        assert!(q.remove::<true>(Some(3)));
        assert!(!q.remove::<true>(Some(3)));
        assert_eq!(q.size(), 7);
        assert_eq!(q.stats().removes, 2);

        let drained = drain(&mut q);
        assert!(drained.iter().all(|(_, o)| *o != 3));
        assert!(drained.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    pub(crate) fn check_retime<Q: TimedQueue<u32>>(mut q: Q) {
        q.emplace::<false>(NetlistTime::from_nsec(10), Some(1));
        q.emplace::<false>(NetlistTime::from_nsec(20), Some(2));
        q.emplace::<false>(NetlistTime::from_nsec(30), Some(3));

        assert!(q.retime::<true>(QueueEntry::new(NetlistTime::from_nsec(25), Some(1))));
        assert!(q.retime::<true>(QueueEntry::new(NetlistTime::from_nsec(5), Some(3))));
        assert!(!q.retime::<true>(QueueEntry::new(NetlistTime::from_nsec(5), Some(7))));
        assert_eq!(q.size(), 3);
        assert_eq!(drain(&mut q), vec![(5, 3), (20, 2), (25, 1)]);
    }

    pub(crate) fn check_empty_and_clear<Q: TimedQueue<u32>>(mut q: Q) {
        assert!(q.is_empty());
        assert!(q.top().exec_time().is_never());
        assert!(q.pop().object().is_none());
        q.emplace::<false>(NetlistTime::from_nsec(1), Some(1));
        q.emplace::<false>(NetlistTime::from_nsec(2), None);
        q.clear();
        assert!(q.is_empty());
        assert!(q.top().exec_time().is_never());
    }
}
