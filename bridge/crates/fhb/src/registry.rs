//! Ring Registry - Foreign Ring to Owning Handle
//!
//! Enforces that a foreign ring is wrapped by at most one handle. An entry is
//! claimed when the ring handle is created and released once the deferred
//! queue has destroyed the foreign ring.

use crate::error::{FhbError, Result};
use crate::handle::{ForeignPtr, HandleRef};
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct RingRegistry {
    owners: FxHashMap<ForeignPtr, HandleRef>,
}

impl RingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owning handle of a foreign ring
    pub fn owner(&self, ring: ForeignPtr) -> Option<HandleRef> {
        self.owners.get(&ring).copied()
    }

    /// Fail if the ring already has an owner
    pub fn check_unowned(&self, ring: ForeignPtr) -> Result<()> {
        match self.owner(ring) {
            Some(existing) => Err(FhbError::DuplicateWrap { ring, existing }),
            None => Ok(()),
        }
    }

    /// Record the owner of a ring
    ///
    /// # Errors
    /// `DuplicateWrap` if the ring is already owned; the existing entry is kept.
    pub fn claim(&mut self, ring: ForeignPtr, handle: HandleRef) -> Result<()> {
        self.check_unowned(ring)?;
        self.insert(ring, handle);
        Ok(())
    }

    /// Record the owner of a ring already checked with [`check_unowned`](Self::check_unowned)
    pub fn insert(&mut self, ring: ForeignPtr, handle: HandleRef) {
        debug_assert!(!self.owners.contains_key(&ring), "ring {} owned twice", ring);
        self.owners.insert(ring, handle);
    }

    /// Forget a destroyed ring
    pub fn release(&mut self, ring: ForeignPtr) -> Option<HandleRef> {
        self.owners.remove(&ring)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
