// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Defragmenter -- per-proxy-writer DATAFRAG reassembly (component E).
//!
//! Generalizes the teacher's discovery-only `FragmentBuffer` (which keyed
//! solely on `(GUID, seqNum)` for SPDP/SEDP payloads) to reassemble
//! fragments for any proxy writer's user-data stream, with the overflow
//! and staleness policy spec.md §4.5 requires: a configurable resource
//! bound, `DROP_OLDEST`/`DROP_NEWEST` eviction, duplicate-fragment
//! accounting, and discarding fragments at or below `last_delivered_seq`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::entity_index::Guid;

/// Overflow policy when the defragmenter's resource bound is reached.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OverflowPolicy {
    /// Evict the lowest-seq partial sample to make room.
    DropOldest,
    /// Reject the incoming fragment, leaving existing partials untouched.
    DropNewest,
}

/// Outcome of `Defragmenter::accept`.
#[derive(Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// All fragments received; the sample is ready for the reorder buffer.
    Complete(Vec<u8>),
    /// Still waiting on more fragments.
    InProgress,
    /// Rejected: stale (at/below `last_delivered_seq`), duplicate, or the
    /// table was full under `DropNewest`.
    Dropped,
}

struct FragmentSet {
    fragments: HashMap<u32, Vec<u8>>,
    total_fragments: u16,
    first_seen: Instant,
    last_updated: Instant,
}

/// Per-proxy-writer fragment reassembly table.
pub struct Defragmenter {
    pending: HashMap<(Guid, u64), FragmentSet>,
    max_pending: usize,
    timeout: Duration,
    overflow_policy: OverflowPolicy,
    last_delivered_seq: HashMap<Guid, u64>,
    discarded_fragment_bytes: u64,
}

impl Defragmenter {
    #[must_use]
    pub fn new(max_pending: usize, timeout: Duration, overflow_policy: OverflowPolicy) -> Self {
        Self {
            pending: HashMap::with_capacity(max_pending),
            max_pending,
            timeout,
            overflow_policy,
            last_delivered_seq: HashMap::new(),
            discarded_fragment_bytes: 0,
        }
    }

    /// Record the highest seq already delivered for a proxy writer, so
    /// late fragments for it are discarded rather than buffered.
    pub fn set_last_delivered_seq(&mut self, writer: Guid, seq: u64) {
        let entry = self.last_delivered_seq.entry(writer).or_insert(0);
        if seq > *entry {
            *entry = seq;
        }
    }

    /// Accept one DATAFRAG fragment and attempt reassembly.
    ///
    /// `frag_num` is 1-based per spec.md §3 ("Fragment number ... starts
    /// at 1"); `total_frags` is the sample's `fragmentsInSubmessage`.
    pub fn accept(
        &mut self,
        writer: Guid,
        seq: u64,
        frag_num: u32,
        total_frags: u16,
        data: Vec<u8>,
    ) -> AcceptOutcome {
        let last_delivered = self.last_delivered_seq.get(&writer).copied().unwrap_or(0);
        if seq <= last_delivered {
            self.discarded_fragment_bytes += data.len() as u64;
            return AcceptOutcome::Dropped;
        }

        let key = (writer, seq);
        let now = Instant::now();

        if !self.pending.contains_key(&key) && self.pending.len() >= self.max_pending {
            match self.overflow_policy {
                OverflowPolicy::DropOldest => self.evict_oldest(),
                OverflowPolicy::DropNewest => {
                    self.discarded_fragment_bytes += data.len() as u64;
                    return AcceptOutcome::Dropped;
                }
            }
        }

        let frag_set = self.pending.entry(key).or_insert_with(|| FragmentSet {
            fragments: HashMap::new(),
            total_fragments: total_frags,
            first_seen: now,
            last_updated: now,
        });
        frag_set.last_updated = now;
        frag_set.total_fragments = total_frags;

        if frag_set.fragments.contains_key(&frag_num) {
            // Duplicate fragment: discarded, accounted separately from drops.
            self.discarded_fragment_bytes += data.len() as u64;
            return AcceptOutcome::InProgress;
        }
        frag_set.fragments.insert(frag_num, data);

        if frag_set.fragments.len() == total_frags as usize {
            let frag_set = self.pending.remove(&key).expect("just inserted above");
            AcceptOutcome::Complete(Self::reassemble(&frag_set))
        } else {
            AcceptOutcome::InProgress
        }
    }

    fn reassemble(frag_set: &FragmentSet) -> Vec<u8> {
        let total: usize = frag_set.fragments.values().map(Vec::len).sum();
        let mut payload = Vec::with_capacity(total);
        for frag_num in 1..=frag_set.total_fragments {
            if let Some(data) = frag_set.fragments.get(&u32::from(frag_num)) {
                payload.extend_from_slice(data);
            }
        }
        payload
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .pending
            .iter()
            .min_by_key(|(_, fs)| fs.last_updated)
            .map(|(k, _)| *k);
        if let Some(key) = oldest {
            self.pending.remove(&key);
        }
    }

    /// Evict partial samples older than the configured timeout.
    pub fn evict_expired(&mut self) -> usize {
        let now = Instant::now();
        let timeout = self.timeout;
        let before = self.pending.len();
        self.pending.retain(|_, fs| now.duration_since(fs.first_seen) <= timeout);
        before - self.pending.len()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn discarded_fragment_bytes(&self) -> u64 {
        self.discarded_fragment_bytes
    }
}
