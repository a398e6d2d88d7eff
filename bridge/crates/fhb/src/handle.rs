//! Handle - Tagged Wrapper Around a Foreign Object
//!
//! A [`TaggedHandle`] is the payload the host collector manages for each
//! wrapped foreign object. It exclusively owns one foreign pointer and may
//! carry host-visible slots:
//!
//! ```text
//! ┌────────────┬──────────┬──────────────┬───────────────────────────────┐
//! │ kind       │ imm flag │ foreign ptr  │ extra                         │
//! │            │ (1-way)  │ (owned)      │ ring-dependent: owning ring   │
//! │            │          │              │ ring / q-ring: zero/one cache │
//! └────────────┴──────────┴──────────────┴───────────────────────────────┘
//! ```
//!
//! The foreign pointer is opaque: nothing in this module dereferences it.
//! Host-visible slots hold [`HandleRef`]s, the host's names for other
//! handles, and are what the mark callback reports.

use crate::kind::{Kind, Tag};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Opaque address in the foreign heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ForeignPtr(usize);

impl ForeignPtr {
    /// Null foreign pointer
    pub const NULL: ForeignPtr = ForeignPtr(0);

    #[inline]
    pub const fn new(addr: usize) -> Self {
        ForeignPtr(addr)
    }

    #[inline]
    pub const fn addr(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ForeignPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Host-side reference to a handle
///
/// The value is chosen by the host collector; the bridge only stores and
/// reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct HandleRef(u64);

impl HandleRef {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        HandleRef(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// Owning ring of a ring-dependent handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBinding {
    /// Host reference to the ring handle, reported during marking
    pub handle: HandleRef,
    /// Foreign ring pointer, passed as context to teardown
    pub context: ForeignPtr,
}

/// Zero/one element caches of a ring or q-ring
#[derive(Debug, Default)]
pub(crate) struct RingConstants {
    pub(crate) zero: OnceLock<HandleRef>,
    pub(crate) one: OnceLock<HandleRef>,
}

#[derive(Debug)]
enum Extra {
    None,
    Ring(RingBinding),
    Constants(RingConstants),
}

/// Wrapped foreign object held by the host collector
#[derive(Debug)]
pub struct TaggedHandle {
    kind: Kind,
    immutable: AtomicBool,
    foreign: ForeignPtr,
    attributes: Mutex<Option<ForeignPtr>>,
    extra: Extra,
}

impl TaggedHandle {
    /// Handle for a kind without an owning ring
    pub(crate) fn plain(tag: Tag, foreign: ForeignPtr) -> Self {
        debug_assert!(!tag.kind.is_ring_dependent() && !tag.kind.is_ring());
        Self::build(tag, foreign, Extra::None)
    }

    /// Handle for a ring-dependent kind
    pub(crate) fn with_ring(tag: Tag, foreign: ForeignPtr, ring: RingBinding) -> Self {
        debug_assert!(tag.kind.is_ring_dependent());
        Self::build(tag, foreign, Extra::Ring(ring))
    }

    /// Handle for a ring or q-ring, with empty zero/one caches
    pub(crate) fn for_ring(tag: Tag, foreign: ForeignPtr) -> Self {
        debug_assert!(tag.kind.is_ring());
        Self::build(tag, foreign, Extra::Constants(RingConstants::default()))
    }

    fn build(tag: Tag, foreign: ForeignPtr, extra: Extra) -> Self {
        TaggedHandle {
            kind: tag.kind,
            immutable: AtomicBool::new(tag.immutable),
            foreign,
            attributes: Mutex::new(None),
            extra,
        }
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Current tag, including the immutability variant
    #[inline]
    pub fn tag(&self) -> Tag {
        Tag {
            kind: self.kind,
            immutable: self.is_immutable(),
        }
    }

    #[inline]
    pub fn is_immutable(&self) -> bool {
        self.immutable.load(Ordering::Acquire)
    }

    /// Set the immutable flag
    ///
    /// Returns `true` if this call changed the flag.
    pub(crate) fn set_immutable(&self) -> bool {
        !self.immutable.swap(true, Ordering::AcqRel)
    }

    /// Owned foreign pointer
    #[inline]
    pub fn foreign(&self) -> ForeignPtr {
        self.foreign
    }

    /// Owning ring, present iff the kind is ring-dependent
    pub fn ring(&self) -> Option<&RingBinding> {
        match &self.extra {
            Extra::Ring(binding) => Some(binding),
            _ => None,
        }
    }

    /// Foreign ring context used for teardown
    pub fn ring_context(&self) -> Option<ForeignPtr> {
        self.ring().map(|binding| binding.context)
    }

    pub(crate) fn constants(&self) -> Option<&RingConstants> {
        match &self.extra {
            Extra::Constants(constants) => Some(constants),
            _ => None,
        }
    }

    /// Cached zero element, if populated
    pub fn zero(&self) -> Option<HandleRef> {
        self.constants().and_then(|c| c.zero.get().copied())
    }

    /// Cached one element, if populated
    pub fn one(&self) -> Option<HandleRef> {
        self.constants().and_then(|c| c.one.get().copied())
    }

    /// Attached attribute metadata
    pub fn attributes(&self) -> Option<ForeignPtr> {
        *self.attributes.lock()
    }

    /// Install new attribute metadata, returning the previous record
    pub(crate) fn replace_attributes(&self, attrs: Option<ForeignPtr>) -> Option<ForeignPtr> {
        std::mem::replace(&mut *self.attributes.lock(), attrs)
    }

    /// Host references embedded in this handle
    ///
    /// Owning ring first, then zero and one caches. The foreign pointer is
    /// never reported.
    pub fn references(&self) -> MarkRefs {
        let refs = match &self.extra {
            Extra::None => [None, None],
            Extra::Ring(binding) => [Some(binding.handle), None],
            Extra::Constants(c) => [c.zero.get().copied(), c.one.get().copied()],
        };
        MarkRefs { refs, pos: 0 }
    }
}

/// Iterator over the host references of one handle
#[derive(Debug, Clone)]
pub struct MarkRefs {
    refs: [Option<HandleRef>; 2],
    pos: usize,
}

impl Iterator for MarkRefs {
    type Item = HandleRef;

    fn next(&mut self) -> Option<HandleRef> {
        while self.pos < self.refs.len() {
            let slot = self.refs[self.pos];
            self.pos += 1;
            if slot.is_some() {
                return slot;
            }
        }
        None
    }
}
