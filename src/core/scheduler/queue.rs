//! Tick-ordered delay queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Wrapper ordering items by due tick (earliest first), FIFO within a tick.
struct Delayed<T> {
    due: u64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Delayed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Delayed<T> {}

impl<T> PartialOrd for Delayed<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Delayed<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for the max-heap: earlier due tick, then earlier submission, wins.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of items keyed by the tick they become due.
pub(crate) struct DelayQueue<T> {
    heap: BinaryHeap<Delayed<T>>,
    next_seq: u64,
}

impl<T> DelayQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn push(&mut self, due: u64, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Delayed { due, seq, item });
    }

    /// Pop the earliest item if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: u64) -> Option<T> {
        if self.heap.peek().is_some_and(|head| head.due <= now) {
            self.heap.pop().map(|d| d.item)
        } else {
            None
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Remove everything, in no particular order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        self.heap.drain().map(|d| d.item).collect()
    }
}
