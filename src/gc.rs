// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Garbage Collector -- quiescence-based reclamation (component I).
//!
//! spec.md §4.9: "Every worker thread maintains a counter ('v-time') that
//! is even while the thread is 'awake' ... and odd while 'asleep'. GC
//! enqueues a deletion request stamped with the current v-times of all
//! worker threads; the request is eligible for free only once every
//! thread has advanced past (or remained in odd state since) its
//! recorded value. Proxy writers require an additional stage: after the
//! base delay, a 'bubble' is enqueued into their delivery queue G;
//! freeing waits until the bubble is drained."
//!
//! This is the same epoch/quiescence idea as a read-copy-update
//! reclaimer, sized down to what the engine actually needs: no global
//! epoch, just a per-thread parity counter and a FIFO of pending
//! reclamations checked against it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::delivery_queue::{DeliveryItem, DeliveryQueue};
use crate::entity_index::Guid;

/// A single worker thread's v-time counter. Even = awake (may hold
/// references into shared entity state), odd = asleep.
#[derive(Default)]
pub struct VTime(AtomicU64);

impl VTime {
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Mark the thread awake; call at the top of each receive/delivery
    /// loop iteration before touching shared entities. Forces the
    /// counter to its next even value regardless of the current parity
    /// (mirrors `thread_state_awake`): asleep (odd) -> +1, awake (even)
    /// -> +2, so a stray repeated call never un-marks the thread.
    pub fn enter(&self) {
        let vt = self.0.load(Ordering::Acquire);
        let step = if vt % 2 == 1 { 1 } else { 2 };
        self.0.fetch_add(step, Ordering::AcqRel);
    }

    /// Mark the thread asleep; call when blocking (e.g. on a socket read
    /// or a full delivery queue) so GC is not stalled by a blocked peer.
    /// Forces the counter to its next odd value regardless of current
    /// parity (mirrors `thread_state_asleep`).
    pub fn exit(&self) {
        let vt = self.0.load(Ordering::Acquire);
        let step = if vt.is_multiple_of(2) { 1 } else { 2 };
        self.0.fetch_add(step, Ordering::AcqRel);
    }

    #[must_use]
    pub fn snapshot(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Extra teardown stage required for proxy writers (spec.md §4.9): a
/// "bubble" item pushed through the delivery queue; the entity cannot be
/// freed until every consumer has drained it.
pub struct ProxyWriterBubble {
    queue: Arc<DeliveryQueue>,
    source: Guid,
}

struct PendingDeletion {
    entity: Guid,
    stamps: Vec<u64>,
    bubble: Option<ProxyWriterBubble>,
    bubble_sent: bool,
}

/// Quiescence-based reclaimer: tracks each worker thread's v-time and
/// releases deletion requests once every thread has moved past the
/// v-time recorded when the deletion was enqueued.
pub struct GarbageCollector {
    threads: Vec<Arc<VTime>>,
    pending: Mutex<VecDeque<PendingDeletion>>,
}

impl GarbageCollector {
    #[must_use]
    pub fn new(threads: Vec<Arc<VTime>>) -> Self {
        Self {
            threads,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueue a plain entity for deletion once every worker thread is
    /// provably no longer referencing it.
    pub fn retire(&self, entity: Guid) {
        let stamps = self.threads.iter().map(|t| t.snapshot()).collect();
        self.pending.lock().unwrap().push_back(PendingDeletion {
            entity,
            stamps,
            bubble: None,
            bubble_sent: false,
        });
    }

    /// Enqueue a proxy writer for deletion. In addition to the v-time
    /// quiescence check, a bubble is pushed through its delivery queue
    /// and must be drained before the entity is actually freed.
    pub fn retire_proxy_writer(&self, entity: Guid, queue: Arc<DeliveryQueue>) {
        let stamps = self.threads.iter().map(|t| t.snapshot()).collect();
        self.pending.lock().unwrap().push_back(PendingDeletion {
            entity,
            stamps,
            bubble: Some(ProxyWriterBubble { queue, source: entity }),
            bubble_sent: false,
        });
    }

    fn is_quiescent(stamps: &[u64], current: &[Arc<VTime>]) -> bool {
        stamps.iter().zip(current.iter()).all(|(&recorded, thread)| {
            let now = thread.snapshot();
            // Even (awake) threads must have advanced; odd (asleep)
            // threads have been quiescent continuously since recorded.
            now > recorded || recorded % 2 == 1
        })
    }

    /// Drive one collection pass: returns every entity GUID now safe to
    /// free. The caller (the GC thread, spec.md §5) is responsible for
    /// the actual deallocation/removal from other structures.
    pub fn collect(&self) -> Vec<Guid> {
        let mut freed = Vec::new();
        let mut pending = self.pending.lock().unwrap();
        let mut still_pending = VecDeque::with_capacity(pending.len());

        while let Some(mut deletion) = pending.pop_front() {
            if !Self::is_quiescent(&deletion.stamps, &self.threads) {
                still_pending.push_back(deletion);
                continue;
            }
            if let Some(bubble) = &deletion.bubble {
                if !deletion.bubble_sent {
                    bubble.queue.push(DeliveryItem {
                        proxy_writer: bubble.source,
                        seq: 0,
                        payload: Vec::new(),
                    });
                    deletion.bubble_sent = true;
                }
                if !bubble.queue.is_empty() {
                    still_pending.push_back(deletion);
                    continue;
                }
            }
            freed.push(deletion.entity);
        }

        *pending = still_pending;
        freed
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}
