// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Addrset -- ref-counted, copy-on-write locator set (component K).
//!
//! spec.md §4.11: "AVL trees (one unicast, one multicast) over locators,
//! behind a mutex and a refcount. `ref`/`unref` are atomic; mutation
//! clones under lock." `BTreeSet` is this crate's ordered-tree of choice
//! (the same substitution spec.md §9 sanctions for the lease heap:
//! "ordinary binary heaps are acceptable" in place of a fib-heap) --
//! `BTreeSet` gives the same O(log n) ordered operations an AVL tree does
//! without a hand-rolled balanced tree.

use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// RTPS locator kind (spec.md §6.2).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum LocatorKind {
    Invalid = -1,
    Reserved = 0,
    UdpV4 = 1,
    UdpV6 = 2,
    TcpV4 = 4,
    TcpV6 = 8,
    Shmem = 16,
    RawEth = 0x8000,
    UdpV4McGen = 0x4fff_0000u32 as i32,
}

/// 16-byte wire locator record (spec.md §6.2): `{kind, port, address}`.
///
/// Total ordering covers kind, then port, then address octets; `Invalid`
/// sorts as a sentinel (spec.md: "the 'invalid' kind compares as a
/// sentinel") so it always precedes every other locator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Locator {
    pub kind: LocatorKind,
    pub port: u32,
    pub address: [u8; 16],
}

impl Locator {
    #[must_use]
    pub fn new(kind: LocatorKind, port: u32, address: [u8; 16]) -> Self {
        Self { kind, port, address }
    }

    #[must_use]
    pub fn is_multicast(&self) -> bool {
        matches!(self.kind, LocatorKind::UdpV4McGen)
            || (matches!(self.kind, LocatorKind::UdpV4) && self.address[12] >= 224 && self.address[12] <= 239)
    }
}

impl Ord for Locator {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.kind as i32, self.port, self.address).cmp(&(other.kind as i32, other.port, other.address))
    }
}
impl PartialOrd for Locator {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Default)]
struct Locators {
    unicast: BTreeSet<Locator>,
    multicast: BTreeSet<Locator>,
}

/// Ref-counted, copy-on-write set of unicast and multicast locators,
/// intended to be shared across many endpoints (spec.md §3 "Addrset").
pub struct Addrset {
    inner: Mutex<Arc<Locators>>,
    refcount: AtomicUsize,
}

impl Addrset {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Arc::new(Locators::default())),
            refcount: AtomicUsize::new(1),
        }
    }

    /// Atomic increment, mirroring spec.md's "`ref`/`unref` are atomic".
    pub fn add_ref(&self) -> usize {
        self.refcount.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Atomic decrement; returns the post-decrement count (0 means the
    /// last owner released it and it is safe to drop).
    pub fn unref(&self) -> usize {
        self.refcount.fetch_sub(1, Ordering::AcqRel) - 1
    }

    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    /// Insert a locator. Mutation clones under lock: if another reader is
    /// concurrently holding the previous `Arc<Locators>` snapshot (via
    /// `unicast_locators`/`multicast_locators`), it is unaffected.
    pub fn insert(&self, locator: Locator) {
        let mut guard = self.inner.lock();
        let locators = Arc::make_mut(&mut guard);
        if locator.is_multicast() {
            locators.multicast.insert(locator);
        } else {
            locators.unicast.insert(locator);
        }
    }

    pub fn remove(&self, locator: &Locator) -> bool {
        let mut guard = self.inner.lock();
        let locators = Arc::make_mut(&mut guard);
        locators.unicast.remove(locator) || locators.multicast.remove(locator)
    }

    /// Snapshot of unicast locators (cheap `Arc` clone, safe to read
    /// without holding the lock).
    #[must_use]
    pub fn unicast_locators(&self) -> Vec<Locator> {
        self.inner.lock().unicast.iter().copied().collect()
    }

    #[must_use]
    pub fn multicast_locators(&self) -> Vec<Locator> {
        self.inner.lock().multicast.iter().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let guard = self.inner.lock();
        guard.unicast.is_empty() && guard.multicast.is_empty()
    }
}

impl Default for Addrset {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ucast(port: u32, last_octet: u8) -> Locator {
        let mut addr = [0u8; 16];
        addr[12] = 192;
        addr[13] = 168;
        addr[14] = 1;
        addr[15] = last_octet;
        Locator::new(LocatorKind::UdpV4, port, addr)
    }

    fn mcast(port: u32) -> Locator {
        let mut addr = [0u8; 16];
        addr[12] = 239;
        addr[15] = 1;
        Locator::new(LocatorKind::UdpV4, port, addr)
    }

    #[test]
    fn test_insert_classifies_unicast_vs_multicast() {
        let set = Addrset::new();
        set.insert(ucast(7411, 10));
        set.insert(mcast(7400));
        assert_eq!(set.unicast_locators().len(), 1);
        assert_eq!(set.multicast_locators().len(), 1);
    }

    #[test]
    fn test_remove() {
        let set = Addrset::new();
        let loc = ucast(7411, 10);
        set.insert(loc);
        assert!(set.remove(&loc));
        assert!(set.is_empty());
    }

    #[test]
    fn test_refcount() {
        let set = Addrset::new();
        assert_eq!(set.ref_count(), 1);
        assert_eq!(set.add_ref(), 2);
        assert_eq!(set.unref(), 1);
    }

    #[test]
    fn test_cow_snapshot_unaffected_by_later_mutation() {
        let set = Addrset::new();
        set.insert(ucast(7411, 10));
        let snapshot = set.unicast_locators();
        set.insert(ucast(7412, 11));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(set.unicast_locators().len(), 2);
    }

    #[test]
    fn test_invalid_kind_sentinel_sorts_first() {
        let invalid = Locator::new(LocatorKind::Invalid, 0, [0; 16]);
        let valid = ucast(7411, 10);
        assert!(invalid < valid);
    }
}
