// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rdds-engine - RTPS Reliability, Fragmentation, and Delivery Engine
//!
//! The piece of an RTPS/DDS middleware that sits between "bytes parsed off the
//! wire" and "samples delivered to an application": reliable delivery
//! (HEARTBEAT/ACKNACK/NACKFRAG/GAP), fragment reassembly, in-order delivery,
//! liveliness lease administration, and the garbage collection and transmit
//! scheduling that keep a long-running participant's memory and timers bounded.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                      Entity Index / Matching                        |
//! |    GUID registry  |  RxO QoS compatibility  |  lease administration |
//! +---------------------------------------------------------------------+
//! |                     Reliability Protocol Engine                     |
//! |  Writer History Cache | HEARTBEAT/ACKNACK/NACKFRAG/GAP state machine |
//! +---------------------------------------------------------------------+
//! |                  Defragmenter | Reorder Buffer                      |
//! +---------------------------------------------------------------------+
//! |            Delivery Queue | Garbage Collector | Transmit Scheduler   |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`reliability`] - Writer History Cache, HEARTBEAT/ACKNACK/NACKFRAG/GAP
//! - [`entity_index`] - GUID-indexed registry of local and remote entities
//! - [`matching`] - RxO (Request vs Offered) QoS compatibility matching
//! - [`defragmenter`] - DATA_FRAG reassembly into complete samples
//! - [`delivery_queue`] - in-order, back-pressured fan-out to readers
//! - [`lease_admin`] - liveliness lease tracking and expiry detection
//! - [`gc`] - quiescence-based reclamation of retired engine state
//! - [`scheduler`] - timed-event scheduling for retransmission and heartbeats
//! - [`addrset`] - reference-counted locator sets for multi-destination sends
//! - [`qos`] - Quality of Service policies used by matching and the WHC
//! - [`config`] - engine tunables (timing, watermarks, lease durations)
//! - [`error`] - the engine's error taxonomy
//!
//! ## Non-goals
//!
//! This crate does not parse SPDP/SEDP discovery wire data, own transport
//! sockets, implement the full DDS QoS data model, or handle security/crypto.
//! It assumes entities are already discovered and QoS profiles already parsed;
//! it is the engine that keeps reliable delivery correct once that's true.

// Clippy: No blanket suppressions. Fix issues properly or use inline #[allow] with justification.

/// GUID-indexed registry of local and remote entities (writers/readers).
pub mod entity_index;
/// RxO (Request vs Offered) QoS compatibility matching between writers and readers.
pub mod matching;
/// Reassembly of DATA_FRAG submessages into complete samples.
pub mod defragmenter;
/// In-order, back-pressured fan-out of delivered samples to matched readers.
pub mod delivery_queue;
/// Liveliness lease tracking and expiry detection.
pub mod lease_admin;
/// Quiescence-based reclamation of retired reliability/matching state.
pub mod gc;
/// Timed-event scheduling for retransmission timers and heartbeat periods.
pub mod scheduler;
/// Reference-counted, copy-on-write locator sets for multi-destination sends.
pub mod addrset;

/// Core RTPS runtime primitives (slab pools, fan-out merger, WriterProxy state machine).
pub mod core;
/// Engine configuration (timing constants, runtime watermark/lease overrides).
pub mod config;
/// The engine's error taxonomy.
pub mod error;
/// Compile-time configurable logging system (zero-cost when disabled).
pub mod logging;
/// `QoS` (Quality of Service) policies used by matching and the Writer History Cache.
pub mod qos;
/// Reliability QoS implementation (Writer History Cache, RTPS reliability protocol messages).
pub mod reliability;

pub use entity_index::{EntityIndex, EntityKind};
pub use error::{EngineError, EngineResult};
pub use matching::{MatchResult, RxoMatcher};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
