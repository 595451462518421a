// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery Queue -- single-producer, multi-consumer, back-pressured
//! (component G).
//!
//! spec.md §4.7: the proxy writer's receive context is the sole producer;
//! reader handler threads are consumers; the queue blocks the producer
//! when full so flow control propagates back to the network layer on
//! async-delivery paths (spec.md §5 "Suspension points").
//!
//! `core::rt::merger::TopicMerger` is the teacher's fan-out dispatcher for
//! this same "one writer stream, many reader rings" shape, but it is
//! deliberately lossy (`IndexRing::push` returns `false` and the sample is
//! dropped rather than block). This module keeps `TopicMerger`'s fan-out
//! shape for the non-blocking case and adds a bounded, blocking delivery
//! path via `crossbeam::channel` for readers that require it.

use crossbeam::channel::{bounded, Receiver, Sender};
use std::time::Duration;

use crate::entity_index::Guid;

/// A sample in flight to a reader handler, carrying its source proxy
/// writer so the consumer can invoke reader-side listeners with the
/// correct context (spec.md §4.7).
#[derive(Debug, Clone)]
pub struct DeliveryItem {
    pub proxy_writer: Guid,
    pub seq: u64,
    pub payload: Vec<u8>,
}

/// Bounded, blocking single-producer multi-consumer delivery queue.
pub struct DeliveryQueue {
    tx: Sender<DeliveryItem>,
    rx: Receiver<DeliveryItem>,
}

impl DeliveryQueue {
    /// `capacity` bounds the number of in-flight samples; `push` blocks
    /// once the bound is reached until a consumer drains one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Push a sample, blocking if the queue is full.
    ///
    /// Returns `false` if every consumer (`Receiver`) has been dropped,
    /// meaning there is nobody left to deliver to.
    pub fn push(&self, item: DeliveryItem) -> bool {
        self.tx.send(item).is_ok()
    }

    /// Push a sample, blocking at most `timeout`. Used by receive threads
    /// that must still service other proxy writers' heartbeats/timers.
    pub fn push_timeout(&self, item: DeliveryItem, timeout: Duration) -> bool {
        self.tx.send_timeout(item, timeout).is_ok()
    }

    /// Obtain a consumer handle. Multiple handles may be cloned out; each
    /// delivered item goes to exactly one consumer (competing consumers).
    #[must_use]
    pub fn consumer(&self) -> DeliveryConsumer {
        DeliveryConsumer {
            rx: self.rx.clone(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// A reader-handler-side consumer of the delivery queue.
#[derive(Clone)]
pub struct DeliveryConsumer {
    rx: Receiver<DeliveryItem>,
}

impl DeliveryConsumer {
    /// Block until a sample is available.
    pub fn recv(&self) -> Option<DeliveryItem> {
        self.rx.recv().ok()
    }

    /// Block until a sample is available or `timeout` elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DeliveryItem> {
        self.rx.recv_timeout(timeout).ok()
    }
}
