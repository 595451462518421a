// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transmit Scheduler -- min-heap of timed events (component J).
//!
//! spec.md §4.10: "Min-heap of `{deadline, callback, arg}`. Worker thread
//! pops events whose deadline is past, invokes the callback, which may
//! reschedule. Cancellation of an event is O(log n) via a handle."
//!
//! Built on `std::collections::BinaryHeap` (a min-heap via `Reverse`),
//! guarded by `parking_lot::Mutex` in the teacher's lock idiom. Lazy
//! cancellation: a cancelled handle is marked in a side table and the slot
//! is dropped the next time it would otherwise fire, so `cancel` itself is
//! O(1) and does not require a heap-internal decrease-key/removal.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Opaque handle to a scheduled event, usable with `Scheduler::cancel`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct EventHandle(u64);

type Callback = Box<dyn FnOnce() + Send>;

struct ScheduledEvent {
    deadline: Instant,
    id: u64,
    callback: Callback,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for ScheduledEvent {}
impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; callers wrap in `Reverse` for min-heap
        // ordering by deadline. Ties broken by id for determinism.
        self.deadline.cmp(&other.deadline).then(self.id.cmp(&other.id))
    }
}

/// Timed-event scheduler driving heartbeats, retransmits, and lease checks.
///
/// The owner (one instance per domain, spec.md §5) is the sole caller of
/// `run_ready`; callbacks execute outside the heap lock so a rescheduling
/// callback does not deadlock against the mutex it would otherwise reenter.
pub struct Scheduler {
    heap: Mutex<BinaryHeap<Reverse<ScheduledEvent>>>,
    cancelled: DashMap<u64, ()>,
    next_id: AtomicU64,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            cancelled: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Schedule `callback` to run at `deadline`.
    pub fn schedule_at(&self, deadline: Instant, callback: impl FnOnce() + Send + 'static) -> EventHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let event = ScheduledEvent {
            deadline,
            id,
            callback: Box::new(callback),
        };
        self.heap.lock().push(Reverse(event));
        EventHandle(id)
    }

    /// Schedule `callback` to run after `delay` elapses.
    pub fn schedule_after(&self, delay: Duration, callback: impl FnOnce() + Send + 'static) -> EventHandle {
        self.schedule_at(Instant::now() + delay, callback)
    }

    /// Cancel a previously scheduled event. O(1): marks the id so the
    /// worker thread skips it instead of invoking the callback.
    pub fn cancel(&self, handle: EventHandle) {
        self.cancelled.insert(handle.0, ());
    }

    /// Pop and run every event whose deadline is at or before `now`,
    /// skipping cancelled ones. Returns the number of callbacks invoked.
    pub fn run_ready(&self, now: Instant) -> usize {
        let mut ran = 0;
        loop {
            let next = {
                let mut heap = self.heap.lock();
                match heap.peek() {
                    Some(Reverse(event)) if event.deadline <= now => {
                        heap.pop().map(|Reverse(e)| e)
                    }
                    _ => None,
                }
            };
            let Some(event) = next else { break };
            if self.cancelled.remove(&event.id).is_some() {
                continue;
            }
            (event.callback)();
            ran += 1;
        }
        ran
    }

    /// Deadline of the next pending (non-cancelled) event, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let heap = self.heap.lock();
        heap.iter()
            .map(|Reverse(e)| e)
            .filter(|e| !self.cancelled.contains_key(&e.id))
            .map(|e| e.deadline)
            .min()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.heap.lock().len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
