// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Matching + Lease Administration, lease half (component H).
//!
//! spec.md §4.8: "per-participant fibonacci heap ordered by deadline; the
//! overall minimum is cached in an atomic pointer, published to consumers
//! that merely wish to observe (no lock). Renewal moves the entry down
//! the heap; expiry triggers endpoint/participant deletion."
//!
//! spec.md §9 explicitly sanctions the simplification used here: "Ordinary
//! binary heaps are acceptable; fib-heaps are chosen so that renewal ...
//! is O(1) amortized and does not dominate the hot path." This crate uses
//! `std::collections::BinaryHeap` and makes renewal O(1) the same way
//! `scheduler::Scheduler` makes cancellation O(1): a generation counter
//! per entity invalidates the old heap entry lazily instead of doing a
//! heap-internal decrease-key, so renewal never touches the heap at all
//! until the stale entry is eventually popped and discarded.
//!
//! Grounded on `qos::liveliness::LivelinessMonitor` as the leaf primitive
//! (lease duration + last-assert bookkeeping for a single entity); this
//! module is the per-participant structure that orders many such leases.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::entity_index::Guid;
use crate::qos::liveliness::{Liveliness, LivelinessMonitor};

struct LeaseSlot {
    deadline: Instant,
    generation: u64,
    entity: Guid,
}

impl PartialEq for LeaseSlot {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.entity == other.entity
    }
}
impl Eq for LeaseSlot {}
impl PartialOrd for LeaseSlot {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for LeaseSlot {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

struct LeaseState {
    monitor: LivelinessMonitor,
    generation: u64,
}

/// Per-participant lease administration: a priority queue of deadlines
/// plus a lock-free "nearest deadline" snapshot for observers.
pub struct LeaseAdmin {
    heap: Mutex<BinaryHeap<Reverse<LeaseSlot>>>,
    entities: DashMap<Guid, LeaseState>,
    nearest_deadline: ArcSwap<Option<Instant>>,
}

impl LeaseAdmin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            entities: DashMap::new(),
            nearest_deadline: ArcSwap::new(Arc::new(None)),
        }
    }

    /// Register an entity's lease. Replaces any existing lease for the
    /// same GUID.
    pub fn register(&self, entity: Guid, policy: &Liveliness) {
        let monitor = LivelinessMonitor::from_policy(policy);
        let deadline = Instant::now() + policy.lease_duration;
        let generation = 1;
        self.entities.insert(
            entity,
            LeaseState {
                monitor,
                generation,
            },
        );
        self.push_slot(entity, deadline, generation);
    }

    /// Renew (assert liveliness for) an entity. O(1): bumps the
    /// generation counter so the previous heap slot becomes stale, and
    /// pushes a fresh slot; the stale one is discarded lazily on pop.
    pub fn renew(&self, entity: Guid, lease_duration: Duration) {
        let Some(mut state) = self.entities.get_mut(&entity) else {
            return;
        };
        state.monitor.assert();
        state.generation += 1;
        let generation = state.generation;
        drop(state);
        self.push_slot(entity, Instant::now() + lease_duration, generation);
    }

    fn push_slot(&self, entity: Guid, deadline: Instant, generation: u64) {
        self.heap.lock().push(Reverse(LeaseSlot {
            deadline,
            generation,
            entity,
        }));
        self.refresh_nearest_deadline();
    }

    fn refresh_nearest_deadline(&self) {
        let heap = self.heap.lock();
        let nearest = heap
            .iter()
            .filter(|Reverse(slot)| {
                self.entities
                    .get(&slot.entity)
                    .is_some_and(|s| s.generation == slot.generation)
            })
            .map(|Reverse(slot)| slot.deadline)
            .min();
        self.nearest_deadline.store(Arc::new(nearest));
    }

    /// Observe the nearest lease deadline without taking any lock.
    #[must_use]
    pub fn nearest_deadline(&self) -> Option<Instant> {
        **self.nearest_deadline.load()
    }

    /// Pop and return every entity whose lease has expired as of `now`.
    /// Each returned GUID should be forwarded to `delete_entity` by the
    /// caller (spec.md §4.9 garbage collection).
    pub fn expire(&self, now: Instant) -> Vec<Guid> {
        let mut expired = Vec::new();
        loop {
            let candidate = {
                let mut heap = self.heap.lock();
                match heap.peek() {
                    Some(Reverse(slot)) if slot.deadline <= now => heap.pop().map(|Reverse(s)| s),
                    _ => None,
                }
            };
            let Some(slot) = candidate else { break };
            let is_current = self
                .entities
                .get(&slot.entity)
                .is_some_and(|s| s.generation == slot.generation);
            if !is_current {
                continue; // stale slot superseded by a renewal; discard
            }
            self.entities.remove(&slot.entity);
            expired.push(slot.entity);
        }
        if !expired.is_empty() {
            self.refresh_nearest_deadline();
        }
        expired
    }

    #[must_use]
    pub fn is_alive(&self, entity: &Guid) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|s| s.monitor.is_alive())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for LeaseAdmin {
    fn default() -> Self {
        Self::new()
    }
}
