// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine Configuration - Single Source of Truth
//!
//! Centralizes tunables for the reliability/fragmentation/delivery engine:
//! heartbeat/NACK timing, watermark hysteresis, fragment reassembly limits,
//! lease administration, and garbage collection cadence.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: Compile-time defaults (this module's constants)
//! - **Level 2 (Dynamic)**: `RuntimeConfig` for runtime overrides, updated
//!   without taking a lock on the hot path.
//!
//! # Performance
//!
//! - **Lock-free**: `DashMap` for the override store (no `RwLock` contention)
//! - **Atomic swap**: `ArcSwap` for the current watermark snapshot
//! - **O(1)**: All get/set operations are constant time

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// =======================================================================
// Heartbeat / NACK Timing
// =======================================================================

/// Default HEARTBEAT period (milliseconds).
pub const DEFAULT_HEARTBEAT_PERIOD_MS: u64 = 100;

/// Default HEARTBEAT jitter (percent of period, avoids thundering herd).
pub const DEFAULT_HEARTBEAT_JITTER_PCT: u8 = 10;

/// Default NACK coalescing window (milliseconds).
pub const DEFAULT_NACK_WINDOW_MS: u64 = 20;

/// Default initial NACK retry backoff (milliseconds), doubled per retry.
pub const DEFAULT_NACK_INITIAL_BACKOFF_MS: u64 = 50;

/// Maximum NACK retries before a reader is considered unresponsive.
pub const DEFAULT_NACK_MAX_RETRIES: u8 = 5;

// =======================================================================
// Liveliness Lease Administration
// =======================================================================

/// Default liveliness lease duration (milliseconds).
pub const DEFAULT_LEASE_DURATION_MS: u64 = 30_000;

/// Lease check interval (milliseconds): how often the nearest-deadline
/// pointer is re-evaluated against the wall clock.
pub const LEASE_CHECK_INTERVAL_MS: u64 = 1_000;

// =======================================================================
// Writer History Cache Watermarks
// =======================================================================

/// High watermark (percent of quota) at which a reliable writer blocks new
/// samples until acknowledgment catches up.
pub const DEFAULT_HIGH_WATERMARK_PCT: u8 = 90;

/// Low watermark (percent of quota) at which writer back-pressure is released.
///
/// Kept below the high watermark to provide hysteresis and avoid rapid
/// block/unblock oscillation near the boundary.
pub const DEFAULT_LOW_WATERMARK_PCT: u8 = 70;

// =======================================================================
// Fragmentation
// =======================================================================

/// Default maximum number of samples under concurrent reassembly.
pub const DEFAULT_MAX_PENDING_REASSEMBLIES: usize = 256;

/// Default fragment reassembly timeout (milliseconds).
pub const DEFAULT_FRAGMENT_TIMEOUT_MS: u64 = 500;

// =======================================================================
// Garbage Collection
// =======================================================================

/// Default interval between garbage collection sweeps (milliseconds).
pub const DEFAULT_GC_INTERVAL_MS: u64 = 250;

/// Current wall-clock time in nanoseconds since the Unix epoch.
///
/// Centralizes the one place the engine reads `SystemTime::now()` so
/// timestamp handling stays consistent across the history cache, lease
/// administration, and the transmit scheduler.
#[must_use]
pub fn current_time_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

// =======================================================================
// Runtime Configuration (Dynamic, Lock-Free)
// =======================================================================

/// Point-in-time snapshot of watermark configuration, published atomically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatermarkConfig {
    pub high_pct: u8,
    pub low_pct: u8,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            high_pct: DEFAULT_HIGH_WATERMARK_PCT,
            low_pct: DEFAULT_LOW_WATERMARK_PCT,
        }
    }
}

/// Shared runtime configuration (thread-safe, lock-free).
///
/// - `DashMap`: concurrent key-value overrides without a global lock
/// - `ArcSwap`: atomic swap of the current watermark snapshot, readable
///   from the hot path without contention
#[derive(Clone)]
pub struct RuntimeConfig {
    watermarks: Arc<ArcSwap<WatermarkConfig>>,
    overrides: Arc<DashMap<Arc<str>, u64>>,
    lease_duration_ms: Arc<AtomicU64>,
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            watermarks: Arc::new(ArcSwap::new(Arc::new(WatermarkConfig::default()))),
            overrides: Arc::new(DashMap::new()),
            lease_duration_ms: Arc::new(AtomicU64::new(DEFAULT_LEASE_DURATION_MS)),
        }
    }

    /// Atomically replace the watermark configuration.
    #[inline]
    pub fn set_watermarks(&self, config: WatermarkConfig) {
        self.watermarks.store(Arc::new(config));
    }

    /// Read the current watermark configuration (lock-free).
    #[inline]
    #[must_use]
    pub fn watermarks(&self) -> WatermarkConfig {
        **self.watermarks.load()
    }

    /// Set the default liveliness lease duration.
    #[inline]
    pub fn set_lease_duration(&self, duration: Duration) {
        self.lease_duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Read the default liveliness lease duration.
    #[inline]
    #[must_use]
    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms.load(Ordering::Relaxed))
    }

    /// Set a named numeric override (e.g. `"gc.interval_ms"`).
    #[inline]
    pub fn set_override(&self, key: &str, value: u64) {
        self.overrides.insert(Arc::from(key), value);
    }

    /// Read a named numeric override, falling back to `default` if unset.
    #[inline]
    #[must_use]
    pub fn get_override(&self, key: &str, default: u64) -> u64 {
        self.overrides.get(key).map(|v| *v).unwrap_or(default)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_watermarks() {
        let config = RuntimeConfig::new();
        let wm = config.watermarks();
        assert_eq!(wm.high_pct, DEFAULT_HIGH_WATERMARK_PCT);
        assert_eq!(wm.low_pct, DEFAULT_LOW_WATERMARK_PCT);
        assert!(wm.low_pct < wm.high_pct, "hysteresis requires low < high");
    }

    #[test]
    fn test_set_watermarks() {
        let config = RuntimeConfig::new();
        config.set_watermarks(WatermarkConfig {
            high_pct: 80,
            low_pct: 50,
        });
        let wm = config.watermarks();
        assert_eq!(wm.high_pct, 80);
        assert_eq!(wm.low_pct, 50);
    }

    #[test]
    fn test_lease_duration_roundtrip() {
        let config = RuntimeConfig::new();
        assert_eq!(
            config.lease_duration(),
            Duration::from_millis(DEFAULT_LEASE_DURATION_MS)
        );
        config.set_lease_duration(Duration::from_secs(5));
        assert_eq!(config.lease_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = RuntimeConfig::new();
        assert_eq!(config.get_override("gc.interval_ms", 250), 250);
        config.set_override("gc.interval_ms", 1000);
        assert_eq!(config.get_override("gc.interval_ms", 250), 1000);
    }

    #[test]
    fn test_current_time_ns_monotonic_nondecreasing() {
        let a = current_time_ns();
        let b = current_time_ns();
        assert!(b >= a);
    }
}
