//! Cancellable timer queue.
//!
//! "Run this after N ms unless cancelled", driven by the same single-threaded
//! loop that delivers samples. Timers are a min-heap keyed on
//! `(fire_at_ms, id)`; cancellation is lazy, so a cancelled entry stays in
//! the heap and is skipped when it reaches the top.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Handle returned by [`TimerQueue::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

/// Periodic jobs the gesture engine schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Stale-sensor check.
    Watchdog,
    /// Sampling-rate re-evaluation.
    RateCheck,
}

#[derive(Debug)]
struct ScheduledTimer<T> {
    fire_at_ms: u64,
    id: u64,
    payload: T,
}

impl<T> PartialEq for ScheduledTimer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at_ms == other.fire_at_ms && self.id == other.id
    }
}

impl<T> Eq for ScheduledTimer<T> {}

impl<T> PartialOrd for ScheduledTimer<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ScheduledTimer<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: earliest deadline on top, FIFO among equal deadlines
        other
            .fire_at_ms
            .cmp(&self.fire_at_ms)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Min-heap of pending timers.
#[derive(Debug)]
pub struct TimerQueue<T> {
    heap: BinaryHeap<ScheduledTimer<T>>,
    cancelled: HashSet<u64>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_id: 0,
        }
    }

    /// Schedule `payload` to fire at `fire_at_ms`.
    pub fn schedule(&mut self, fire_at_ms: u64, payload: T) -> TimerToken {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(ScheduledTimer {
            fire_at_ms,
            id,
            payload,
        });
        TimerToken(id)
    }

    /// Cancel a pending timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        let pending = self.heap.iter().any(|t| t.id == token.0);
        pending && self.cancelled.insert(token.0)
    }

    /// Earliest live deadline.
    pub fn next_deadline(&mut self) -> Option<u64> {
        self.discard_cancelled();
        self.heap.peek().map(|t| t.fire_at_ms)
    }

    /// Remove and return the earliest timer due at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerToken, T)> {
        self.discard_cancelled();
        if self.heap.peek()?.fire_at_ms > now_ms {
            return None;
        }
        self.heap.pop().map(|t| (TimerToken(t.id), t.payload))
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn discard_cancelled(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.cancelled.remove(&top.id) {
                self.heap.pop();
            } else {
                break;
            }
        }
    }
}
