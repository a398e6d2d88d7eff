//! Stats Module - Bridge Lifecycle Monitoring
//!
//! Counts every lifecycle transition the bridge performs so leaks and
//! double frees show up as mismatched totals:
//! - Handles wrapped vs. finalized
//! - Rings deferred vs. destroyed
//! - Collections triggered by foreign pressure
//! - Known leaks (links)

pub mod metrics;
pub mod timer;

pub use metrics::BridgeMetrics;
pub use timer::StatsTimer;

use crate::host::CollectionMode;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// BridgeStats - atomic lifecycle counters
#[derive(Debug, Default)]
pub struct BridgeStats {
    wrapped: AtomicU64,
    wrapped_rings: AtomicU64,
    finalized: AtomicU64,
    released_immediately: AtomicU64,
    rings_deferred: AtomicU64,
    rings_destroyed: AtomicU64,
    partial_collections: AtomicU64,
    full_collections: AtomicU64,
    drains: AtomicU64,
    leaked_links: AtomicU64,
    duplicate_wraps: AtomicU64,
    collection_time_ns: AtomicU64,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new handle
    pub fn record_wrap(&self, ring: bool) {
        self.wrapped.fetch_add(1, Ordering::Relaxed);
        if ring {
            self.wrapped_rings.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a finalize call; `destroyed` if the foreign object was freed on the spot
    pub fn record_finalize(&self, destroyed: bool) {
        self.finalized.fetch_add(1, Ordering::Relaxed);
        if destroyed {
            self.released_immediately.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_deferred(&self) {
        self.rings_deferred.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a drain that destroyed `rings` rings
    pub fn record_drain(&self, rings: usize) {
        self.drains.fetch_add(1, Ordering::Relaxed);
        self.rings_destroyed
            .fetch_add(rings as u64, Ordering::Relaxed);
    }

    /// Record a pressure-triggered collection
    pub fn record_collection(&self, mode: CollectionMode, duration: Duration) {
        match mode {
            CollectionMode::Partial => self.partial_collections.fetch_add(1, Ordering::Relaxed),
            CollectionMode::Full => self.full_collections.fetch_add(1, Ordering::Relaxed),
        };
        self.collection_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_leaked_link(&self) {
        self.leaked_links.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_wrap(&self) {
        self.duplicate_wraps.fetch_add(1, Ordering::Relaxed);
    }

    /// Get summary statistics
    pub fn summary(&self) -> BridgeSummary {
        let wrapped = self.wrapped.load(Ordering::Relaxed);
        let finalized = self.finalized.load(Ordering::Relaxed);

        BridgeSummary {
            wrapped,
            wrapped_rings: self.wrapped_rings.load(Ordering::Relaxed),
            finalized,
            live_handles: wrapped.saturating_sub(finalized),
            released_immediately: self.released_immediately.load(Ordering::Relaxed),
            rings_deferred: self.rings_deferred.load(Ordering::Relaxed),
            rings_destroyed: self.rings_destroyed.load(Ordering::Relaxed),
            partial_collections: self.partial_collections.load(Ordering::Relaxed),
            full_collections: self.full_collections.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            leaked_links: self.leaked_links.load(Ordering::Relaxed),
            duplicate_wraps: self.duplicate_wraps.load(Ordering::Relaxed),
            collection_time_ms: self.collection_time_ns.load(Ordering::Relaxed) as f64
                / 1_000_000.0,
        }
    }

    /// Reset statistics
    pub fn reset(&self) {
        for counter in [
            &self.wrapped,
            &self.wrapped_rings,
            &self.finalized,
            &self.released_immediately,
            &self.rings_deferred,
            &self.rings_destroyed,
            &self.partial_collections,
            &self.full_collections,
            &self.drains,
            &self.leaked_links,
            &self.duplicate_wraps,
            &self.collection_time_ns,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Summary statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BridgeSummary {
    pub wrapped: u64,
    pub wrapped_rings: u64,
    pub finalized: u64,
    /// Wrapped handles not yet finalized
    pub live_handles: u64,
    pub released_immediately: u64,
    pub rings_deferred: u64,
    pub rings_destroyed: u64,
    pub partial_collections: u64,
    pub full_collections: u64,
    pub drains: u64,
    pub leaked_links: u64,
    pub duplicate_wraps: u64,
    /// Time spent in pressure-triggered collections (ms)
    pub collection_time_ms: f64,
}

impl BridgeSummary {
    /// Rings finalized but not yet destroyed
    pub fn rings_pending(&self) -> u64 {
        self.rings_deferred.saturating_sub(self.rings_destroyed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let stats = BridgeStats::new();
        stats.record_wrap(true);
        stats.record_wrap(false);
        stats.record_finalize(true);
        stats.record_deferred();
        stats.record_collection(CollectionMode::Full, Duration::from_millis(2));

        let summary = stats.summary();
        assert_eq!(summary.wrapped, 2);
        assert_eq!(summary.wrapped_rings, 1);
        assert_eq!(summary.live_handles, 1);
        assert_eq!(summary.rings_pending(), 1);
        assert_eq!(summary.full_collections, 1);
        assert!(summary.collection_time_ms >= 2.0);
    }

    #[test]
    fn test_reset() {
        let stats = BridgeStats::new();
        stats.record_drain(3);
        stats.reset();
        assert_eq!(stats.summary(), BridgeSummary::default());
    }
}
