// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Matching + Lease Administration, RxO half (component H).
//!
//! spec.md §4.8: "a local writer W and a remote reader R match iff topic
//! names equal AND type names equal, W's offered QoS is >= R's requested
//! QoS on every RxO policy ..., partitions overlap ..., and neither is
//! ignored via the 'ignore local' rule." On match, a record is inserted
//! into both endpoints' match tables, and a reliable match allocates a
//! heartbeat event (writer side) and an ACKNACK event (reader side) on
//! the scheduler (component J), with the ACKNACK's initial count
//! randomized the same way `reliability::writer::HeartbeatTx` jitters its
//! period: a seed carved out of `config::current_time_ns()` rather than a
//! dedicated RNG crate.
//!
//! The latency-budget, destination-order, and presentation RxO policies
//! have no QoS data model in this crate (spec.md Non-goals: "full QoS
//! data model"); they are treated as always-compatible placeholders.

use dashmap::DashMap;
use std::collections::BTreeSet;

use crate::config::current_time_ns;
use crate::entity_index::Guid;
use crate::qos::{Durability, QosProfile, Reliability};

/// The minimal identity + QoS a writer or reader presents for matching.
#[derive(Clone, Debug)]
pub struct EndpointProfile {
    pub guid: Guid,
    pub participant: Guid,
    pub topic_name: String,
    pub type_name: String,
    pub qos: QosProfile,
}

impl EndpointProfile {
    #[must_use]
    pub fn new(guid: Guid, participant: Guid, topic_name: impl Into<String>, type_name: impl Into<String>, qos: QosProfile) -> Self {
        Self {
            guid,
            participant,
            topic_name: topic_name.into(),
            type_name: type_name.into(),
            qos,
        }
    }
}

/// Outcome of evaluating a candidate writer/reader pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// Every matching rule is satisfied; `reliable` reflects whether a
    /// heartbeat/ACKNACK pair should be allocated on the scheduler.
    Matched { reliable: bool },
    /// Topic/type names differ.
    TopicMismatch,
    /// One or more RxO QoS policies are incompatible.
    QosIncompatible(&'static str),
    /// Partitions do not overlap.
    PartitionMismatch,
    /// Same-participant endpoints excluded by the "ignore local" rule.
    IgnoredLocal,
}

impl MatchResult {
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }
}

fn reliability_rank(r: Reliability) -> u8 {
    match r {
        Reliability::BestEffort => 0,
        Reliability::Reliable => 1,
    }
}

fn durability_rank(d: Durability) -> u8 {
    match d {
        Durability::Volatile => 0,
        Durability::TransientLocal => 1,
        Durability::Persistent => 2,
    }
}

/// Stateless evaluator for the RxO matching rule (spec.md §4.8).
pub struct RxoMatcher {
    /// If true, a writer and reader in the same participant never match.
    ignore_local: bool,
}

impl RxoMatcher {
    #[must_use]
    pub fn new(ignore_local: bool) -> Self {
        Self { ignore_local }
    }

    /// Evaluate whether offered-writer `w` and requested-reader `r` match.
    pub fn evaluate(&self, w: &EndpointProfile, r: &EndpointProfile) -> MatchResult {
        if self.ignore_local && w.participant == r.participant {
            return MatchResult::IgnoredLocal;
        }
        if w.topic_name != r.topic_name || w.type_name != r.type_name {
            return MatchResult::TopicMismatch;
        }
        if reliability_rank(w.qos.reliability) < reliability_rank(r.qos.reliability) {
            return MatchResult::QosIncompatible("reliability");
        }
        if durability_rank(w.qos.durability) < durability_rank(r.qos.durability) {
            return MatchResult::QosIncompatible("durability");
        }
        if !w.qos.deadline.is_compatible_with(&r.qos.deadline) {
            return MatchResult::QosIncompatible("deadline");
        }
        if !w.qos.liveliness.is_compatible_with(&r.qos.liveliness) {
            return MatchResult::QosIncompatible("liveliness");
        }
        if !w.qos.ownership.is_compatible_with(&r.qos.ownership) {
            return MatchResult::QosIncompatible("ownership");
        }
        // latency-budget, destination-order, presentation: no data model
        // in this crate (spec.md Non-goals), treated as always-compatible.
        if !w.qos.partition.is_compatible_with(&r.qos.partition) {
            return MatchResult::PartitionMismatch;
        }
        let reliable = matches!(w.qos.reliability, Reliability::Reliable);
        MatchResult::Matched { reliable }
    }

    /// Randomized initial ACKNACK count (spec.md §4.8: "initial ACKNACK
    /// count is randomized to spread load"), seeded from the clock the
    /// same way `HeartbeatTx::apply_jitter` derives its jitter factor.
    #[must_use]
    pub fn randomized_initial_acknack_count() -> u32 {
        (current_time_ns() % 1000) as u32
    }
}

/// Per-endpoint match table: writer GUID -> matched reader GUIDs and vice
/// versa. spec.md §4.8: "a match record is inserted into both endpoints'
/// per-endpoint AVL trees"; `BTreeSet` is this crate's ordered-tree
/// substitute (see `addrset` module doc comment for the same rationale).
#[derive(Default)]
pub struct MatchTable {
    writer_to_readers: DashMap<Guid, BTreeSet<Guid>>,
    reader_to_writers: DashMap<Guid, BTreeSet<Guid>>,
}

impl MatchTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed match between `writer` and `reader`.
    pub fn insert(&self, writer: Guid, reader: Guid) {
        self.writer_to_readers.entry(writer).or_default().insert(reader);
        self.reader_to_writers.entry(reader).or_default().insert(writer);
    }

    /// Remove a match (e.g. on reader or writer deletion).
    pub fn remove(&self, writer: &Guid, reader: &Guid) {
        if let Some(mut readers) = self.writer_to_readers.get_mut(writer) {
            readers.remove(reader);
        }
        if let Some(mut writers) = self.reader_to_writers.get_mut(reader) {
            writers.remove(writer);
        }
    }

    /// Drop every match involving `writer` (writer deletion teardown).
    pub fn remove_writer(&self, writer: &Guid) {
        if let Some((_, readers)) = self.writer_to_readers.remove(writer) {
            for reader in readers {
                if let Some(mut writers) = self.reader_to_writers.get_mut(&reader) {
                    writers.remove(writer);
                }
            }
        }
    }

    /// Drop every match involving `reader` (reader deletion teardown).
    pub fn remove_reader(&self, reader: &Guid) {
        if let Some((_, writers)) = self.reader_to_writers.remove(reader) {
            for writer in writers {
                if let Some(mut readers) = self.writer_to_readers.get_mut(&writer) {
                    readers.remove(reader);
                }
            }
        }
    }

    #[must_use]
    pub fn readers_of(&self, writer: &Guid) -> Vec<Guid> {
        self.writer_to_readers
            .get(writer)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn writers_of(&self, reader: &Guid) -> Vec<Guid> {
        self.reader_to_writers
            .get(reader)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_matched(&self, writer: &Guid, reader: &Guid) -> bool {
        self.writer_to_readers
            .get(writer)
            .is_some_and(|readers| readers.contains(reader))
    }
}
