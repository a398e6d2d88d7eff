//! Deferred Ring-Cleanup Queue
//!
//! Rings cannot be destroyed while a collection is sweeping: other handles
//! finalized in the same pass may still need them as teardown context. Their
//! foreign pointers are parked here and destroyed by the post-collection
//! hook.
//!
//! The queue is only appended to from finalize and only drained from the
//! post-collection hook, so a collection triggered from inside allocation
//! never observes a half-drained queue.

use crate::handle::ForeignPtr;

/// Ordered buffer of foreign rings awaiting destruction
#[derive(Debug)]
pub struct DeferredQueue {
    rings: Vec<ForeignPtr>,
}

impl DeferredQueue {
    /// Create an empty queue with the given initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rings: Vec::with_capacity(capacity.max(1)),
        }
    }

    /// Append a ring, doubling the buffer when it is full
    pub fn push(&mut self, ring: ForeignPtr) {
        if self.rings.len() == self.rings.capacity() {
            let grow = self.rings.capacity().max(1);
            self.rings.reserve_exact(grow);
        }
        self.rings.push(ring);
    }

    /// Take all queued rings in enqueue order
    ///
    /// The queue is left empty with its capacity retained.
    pub fn take_batch(&mut self) -> Vec<ForeignPtr> {
        let capacity = self.rings.capacity();
        std::mem::replace(&mut self.rings, Vec::with_capacity(capacity))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.rings.capacity()
    }

    /// Queued rings in enqueue order
    pub fn as_slice(&self) -> &[ForeignPtr] {
        &self.rings
    }
}
