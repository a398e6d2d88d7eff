//! Handle Heap - Minimal Host Collector
//!
//! A stop-the-world mark-sweep collector over [`TaggedHandle`]s, for hosts
//! without a tracing collector of their own.
//!
//! # Reachability
//!
//! A handle survives a collection if it is reachable from:
//! - an explicit root (see [`HandleHeap::root`])
//! - a handle whose `Arc` is currently held outside the heap
//! - in partial mode, any old handle (survivor of a full collection)
//!
//! References between handles are discovered through the registered mark
//! callback. Partial collections therefore only reclaim handles allocated
//! since the last full collection.
//!
//! # Cycle
//!
//! ```text
//! mark (heap locked) ─▶ sweep (heap locked) ─▶ finalize (unlocked) ─▶ post hook
//! ```
//!
//! Finalize and the post hook run without the heap lock, so they may resolve
//! handles. A collection requested while one is running is ignored.

use crate::handle::{HandleRef, TaggedHandle};
use crate::host::{
    CollectionMode, FinalizeCallback, HostCollector, MarkCallback, PostCollectionHook,
};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

struct Slot {
    handle: Arc<TaggedHandle>,
    old: bool,
}

#[derive(Default)]
struct HeapState {
    next_id: u64,
    slots: IndexMap<HandleRef, Slot>,
    roots: FxHashMap<HandleRef, usize>,
}

/// Stop-the-world mark-sweep heap of tagged handles
pub struct HandleHeap {
    state: Mutex<HeapState>,
    finalizer: RwLock<Option<Arc<dyn FinalizeCallback>>>,
    marker: RwLock<Option<Arc<dyn MarkCallback>>>,
    post_hook: Mutex<Option<PostCollectionHook>>,
    collecting: AtomicBool,
    collections: AtomicU64,
}

impl HandleHeap {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeapState {
                next_id: 1,
                ..Default::default()
            }),
            finalizer: RwLock::new(None),
            marker: RwLock::new(None),
            post_hook: Mutex::new(None),
            collecting: AtomicBool::new(false),
            collections: AtomicU64::new(0),
        }
    }

    /// Add a root; roots are counted
    pub fn root(&self, handle: HandleRef) {
        *self.state.lock().roots.entry(handle).or_insert(0) += 1;
    }

    /// Remove one root count
    ///
    /// Returns `false` if the handle was not rooted.
    pub fn unroot(&self, handle: HandleRef) -> bool {
        let mut state = self.state.lock();
        match state.roots.get_mut(&handle) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            },
            Some(_) => {
                state.roots.remove(&handle);
                true
            },
            None => false,
        }
    }

    /// Check if a handle is still live
    pub fn contains(&self, handle: HandleRef) -> bool {
        self.state.lock().slots.contains_key(&handle)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live handles not yet promoted by a full collection
    pub fn young_len(&self) -> usize {
        self.state.lock().slots.values().filter(|s| !s.old).count()
    }

    /// Completed collections
    pub fn collections(&self) -> u64 {
        self.collections.load(Ordering::Acquire)
    }

    fn mark(&self, state: &HeapState, mode: CollectionMode) -> FxHashSet<HandleRef> {
        let marker = self.marker.read().clone();
        let mut marked = FxHashSet::default();
        let mut stack: Vec<HandleRef> = state.roots.keys().copied().collect();

        for (id, slot) in &state.slots {
            let pinned = Arc::strong_count(&slot.handle) > 1;
            if pinned || (mode == CollectionMode::Partial && slot.old) {
                stack.push(*id);
            }
        }

        while let Some(id) = stack.pop() {
            if !marked.insert(id) {
                continue;
            }
            if let Some(slot) = state.slots.get(&id) {
                match &marker {
                    Some(marker) => stack.extend(marker.mark(&slot.handle)),
                    None => stack.extend(slot.handle.references()),
                }
            }
        }

        marked
    }

    fn sweep(
        state: &mut HeapState,
        marked: &FxHashSet<HandleRef>,
        mode: CollectionMode,
    ) -> Vec<Arc<TaggedHandle>> {
        let mut dead = Vec::new();
        state.slots.retain(|id, slot| {
            if marked.contains(id) {
                if mode == CollectionMode::Full {
                    slot.old = true;
                }
                true
            } else {
                dead.push(Arc::clone(&slot.handle));
                false
            }
        });
        dead
    }
}

impl Default for HandleHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCollector for HandleHeap {
    fn collect(&self, mode: CollectionMode) -> bool {
        if self.collecting.swap(true, Ordering::AcqRel) {
            log::debug!("{} collection requested during a collection, ignored", mode);
            return false;
        }

        let dead = {
            let mut state = self.state.lock();
            let marked = self.mark(&state, mode);
            Self::sweep(&mut state, &marked, mode)
        };

        log::debug!("{} collection reclaimed {} handles", mode, dead.len());

        let finalizer = self.finalizer.read().clone();
        if let Some(finalizer) = finalizer {
            for handle in &dead {
                finalizer.finalize(handle);
            }
        }
        drop(dead);

        self.collections.fetch_add(1, Ordering::AcqRel);

        let hook = self.post_hook.lock().clone();
        if let Some(hook) = hook {
            hook();
        }

        self.collecting.store(false, Ordering::Release);
        true
    }

    fn adopt(&self, handle: TaggedHandle) -> HandleRef {
        let mut state = self.state.lock();
        let id = HandleRef::from_raw(state.next_id);
        state.next_id += 1;
        state.slots.insert(
            id,
            Slot {
                handle: Arc::new(handle),
                old: false,
            },
        );
        id
    }

    fn resolve(&self, handle: HandleRef) -> Option<Arc<TaggedHandle>> {
        self.state
            .lock()
            .slots
            .get(&handle)
            .map(|slot| Arc::clone(&slot.handle))
    }

    fn register_finalizer(&self, callback: Arc<dyn FinalizeCallback>) {
        *self.finalizer.write() = Some(callback);
    }

    fn register_marker(&self, callback: Arc<dyn MarkCallback>) {
        *self.marker.write() = Some(callback);
    }

    fn replace_post_collection_hook(&self, hook: PostCollectionHook) -> Option<PostCollectionHook> {
        self.post_hook.lock().replace(hook)
    }
}
