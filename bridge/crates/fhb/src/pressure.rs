//! GC Pressure Monitor
//!
//! The host collector cannot see foreign allocations, so a program that
//! creates many small handles to large foreign objects would never collect.
//! The monitor compares the foreign resident byte count against an adaptive
//! threshold before each handle allocation and requests a collection when it
//! is exceeded.
//!
//! A firing runs in steps so the caller can drop its lock around the
//! collection itself:
//!
//! 1. [`PressureMonitor::next_mode`] picks partial or full without changing state
//! 2. the host collects; a request the host ignores ends the firing here
//! 3. [`PressureMonitor::plan`] advances or resets the counter
//! 4. [`PressureMonitor::settle`] retunes the threshold from the post-collection reading

use crate::config::BridgeConfig;
use crate::host::CollectionMode;
use serde::Serialize;

/// Adaptive collection trigger
#[derive(Debug, Clone)]
pub struct PressureMonitor {
    threshold_bytes: usize,
    counter: u32,
    full_interval: u32,
    multiplier: usize,
}

impl PressureMonitor {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            threshold_bytes: config.initial_threshold_bytes,
            counter: 0,
            full_interval: config.full_collection_interval,
            multiplier: config.threshold_multiplier,
        }
    }

    /// Check if a reading exceeds the threshold
    #[inline]
    pub fn needs_collection(&self, bytes: usize) -> bool {
        bytes > self.threshold_bytes
    }

    /// Mode the next firing will use
    #[inline]
    pub fn next_mode(&self) -> CollectionMode {
        if self.counter == self.full_interval {
            CollectionMode::Full
        } else {
            CollectionMode::Partial
        }
    }

    /// Commit a firing: reset the counter after a full collection, advance it otherwise
    pub fn plan(&mut self) -> CollectionMode {
        let mode = self.next_mode();
        match mode {
            CollectionMode::Full => self.counter = 0,
            CollectionMode::Partial => self.counter += 1,
        }
        mode
    }

    /// Retune the threshold from the post-collection reading
    ///
    /// Returns the new threshold.
    pub fn settle(&mut self, bytes_after: usize) -> usize {
        self.threshold_bytes = bytes_after.saturating_mul(self.multiplier);
        self.threshold_bytes
    }

    #[inline]
    pub fn threshold_bytes(&self) -> usize {
        self.threshold_bytes
    }

    #[inline]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn state(&self) -> PressureState {
        PressureState {
            threshold_bytes: self.threshold_bytes,
            counter: self.counter,
        }
    }
}

/// Snapshot of the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PressureState {
    pub threshold_bytes: usize,
    pub counter: u32,
}

/// Result of one firing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PressureOutcome {
    pub mode: CollectionMode,
    pub bytes_before: usize,
    pub bytes_after: usize,
    pub threshold_bytes: usize,
}
