//! Host Collector Interface
//!
//! The bridge never owns handles itself. It hands every new [`TaggedHandle`]
//! to a [`HostCollector`], which decides reachability, and receives two
//! narrow callbacks back:
//!
//! - [`FinalizeCallback`] - invoked once per unreachable handle during sweep
//! - [`MarkCallback`] - invoked during tracing to enumerate embedded references
//!
//! plus one chained post-collection hook that runs after the sweep.

use crate::handle::{HandleRef, MarkRefs, TaggedHandle};
use std::fmt;
use std::sync::Arc;

/// Collection requested by the pressure monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMode {
    /// Young/incremental collection
    Partial,
    /// Collection of the whole host heap
    Full,
}

impl fmt::Display for CollectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionMode::Partial => write!(f, "partial"),
            CollectionMode::Full => write!(f, "full"),
        }
    }
}

/// Called by the host once for each handle it has proven unreachable
pub trait FinalizeCallback: Send + Sync {
    fn finalize(&self, handle: &TaggedHandle);
}

/// Called by the host while tracing; must not have side effects
pub trait MarkCallback: Send + Sync {
    fn mark(&self, handle: &TaggedHandle) -> MarkRefs;
}

/// Behavior run after a collection has fully completed
pub type PostCollectionHook = Arc<dyn Fn() + Send + Sync>;

/// Tracing collector that owns the handles
///
/// Collections are synchronous: `collect` returns after the sweep and the
/// post-collection hook have run.
pub trait HostCollector {
    /// Run a collection
    ///
    /// Returns `false` if the host declined the request, for example because
    /// a collection is already running.
    fn collect(&self, mode: CollectionMode) -> bool;

    /// Take ownership of a new handle and name it
    ///
    /// Must not run a collection.
    fn adopt(&self, handle: TaggedHandle) -> HandleRef;

    /// Look up a live handle
    fn resolve(&self, handle: HandleRef) -> Option<Arc<TaggedHandle>>;

    /// Register the finalize callback
    fn register_finalizer(&self, callback: Arc<dyn FinalizeCallback>);

    /// Register the mark callback
    fn register_marker(&self, callback: Arc<dyn MarkCallback>);

    /// Install a new post-collection hook, returning the one it replaces
    fn replace_post_collection_hook(&self, hook: PostCollectionHook) -> Option<PostCollectionHook>;
}
