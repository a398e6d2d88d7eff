//! # FHB - Foreign Handle Bridge
//!
//! FHB connects a tracing garbage-collected host runtime to a foreign
//! mathematics library that manages its own heap through manual allocation
//! and ad-hoc reference counting. The host holds opaque handles to foreign
//! rings, polynomials, ideals, numbers and matrices; FHB makes sure each
//! foreign object lives exactly as long as its handle is reachable and is
//! destroyed exactly once.
//!
//! ## Overview
//!
//! - **Tagged Handles**: kind + immutability flag + owned foreign pointer,
//!   plus host-visible slots for the owning ring and cached zero/one elements
//! - **Dispatch Table**: per-kind ring dependency and teardown
//! - **Deferred Ring Cleanup**: rings are destroyed after the collection
//!   completes, never during the sweep
//! - **Pressure Monitor**: foreign resident bytes trigger host collections
//! - **Mark/Finalize Callbacks**: the host's only view into handle internals
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fhb::{Bridge, BridgeConfig, HandleHeap, HostCollector, CollectionMode, Kind, ForeignPtr};
//! use std::sync::Arc;
//!
//! let heap = HandleHeap::new();
//! let bridge = Arc::new(fhb::init_with_config(MyLibrary::open(), BridgeConfig::default())?);
//! bridge.install(&heap);
//!
//! let ring = bridge.wrap_ring(&heap, Kind::Ring.immutable(), ring_ptr)?;
//! heap.root(ring);
//! let poly = bridge.wrap_with_ring(&heap, Kind::Poly, poly_ptr, ring)?;
//!
//! // poly is unrooted: it is finalized here; the ring is rooted and survives
//! heap.collect(CollectionMode::Full);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Host Collector                         │
//! │   adopt / resolve      mark ◀─┐   finalize ◀─┐  post hook │
//! └────────┬──────────────────────┼──────────────┼─────┬──────┘
//!          │                      │              │     │
//! ┌────────┼──────────────────────┼──────────────┼─────┼──────┐
//! │        ▼                Bridge│              │     ▼      │
//! │  wrap / wrap_with_ring   mark_references  finalize  drain │
//! │  wrap_ring                                   │       │    │
//! │     │                                        ▼       │    │
//! │     ▼                              Dispatch Table    │    │
//! │  Pressure Monitor ── collect        │      │         │    │
//! │                                     ▼      ▼         ▼    │
//! │                          destroy now   Deferred Queue     │
//! └──────────────────────────────┬───────────────────┬────────┘
//!                                ▼                   ▼
//!                        Foreign Library (teardown, resident bytes)
//! ```
//!
//! ## Execution Model
//!
//! Collections are stop-the-world and synchronous. Handle construction may
//! recursively run a whole collection cycle; the deferred queue is only
//! appended to from finalize and only drained from the post-collection hook,
//! and the pressure monitor lock is never held across a collection.

// Core types
pub mod config;
pub mod error;
pub mod handle;
pub mod kind;

// Collector and library seams
pub mod foreign;
pub mod host;

// Lifecycle machinery
pub mod bridge;
pub mod deferred;
pub mod finalizer;
pub mod pressure;
pub mod registry;

// Built-in host collector
pub mod heap;

// Monitoring
pub mod logging;
pub mod stats;

// Re-export main types for convenience
pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::{FhbError, Result};
pub use finalizer::Disposal;
pub use foreign::ForeignLibrary;
pub use handle::{ForeignPtr, HandleRef, MarkRefs, TaggedHandle};
pub use heap::HandleHeap;
pub use host::{CollectionMode, FinalizeCallback, HostCollector, MarkCallback, PostCollectionHook};
pub use kind::{Kind, Tag};

/// FHB version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a bridge configured from the environment
///
/// See [`BridgeConfig::from_env`] for the recognised variables.
pub fn init<L: ForeignLibrary>(library: L) -> Result<Bridge<L>> {
    Bridge::new(library, BridgeConfig::from_env())
}

/// Create a bridge with an explicit configuration
pub fn init_with_config<L: ForeignLibrary>(library: L, config: BridgeConfig) -> Result<Bridge<L>> {
    Bridge::new(library, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign::mock::RecordingLibrary;

    #[test]
    fn test_init_with_config() {
        let bridge = init_with_config(RecordingLibrary::new(), BridgeConfig::default());
        assert!(bridge.is_ok());
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
