//! Kind - Foreign Object Categories and Dispatch Table
//!
//! Every wrapped foreign object belongs to one [`Kind`]. Each kind exists in a
//! mutable and an immutable variant; the variant is carried separately in a
//! [`Tag`] so that dispatch never has to mask bits.
//!
//! Raw tag layout (only used at the C ABI boundary):
//! ```text
//! ┌──────────────────────────────┬─────┐
//! │        kind index            │ IMM │
//! │          31-1                │  0  │
//! └──────────────────────────────┴─────┘
//! ```
//!
//! The static [`DispatchEntry`] table records, per kind, whether the foreign
//! value only makes sense relative to an owning ring and which teardown
//! applies when the handle is finalized.

use crate::error::{FhbError, Result};
use std::fmt;

/// Immutability bit of a raw tag
pub const IMMUTABLE_BIT: u32 = 1;

/// Closed enumeration of foreign object categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Ring,
    QRing,
    Ideal,
    Module,
    Matrix,
    Vector,
    Poly,
    Number,
    BigInt,
    Int,
    IntVec,
    IntMat,
    BigIntMat,
    Map,
    List,
    String,
    Link,
    Resolution,
}

impl Kind {
    /// Number of kinds
    pub const COUNT: usize = 18;

    /// All kinds in raw-tag order
    pub const ALL: [Kind; Kind::COUNT] = [
        Kind::Ring,
        Kind::QRing,
        Kind::Ideal,
        Kind::Module,
        Kind::Matrix,
        Kind::Vector,
        Kind::Poly,
        Kind::Number,
        Kind::BigInt,
        Kind::Int,
        Kind::IntVec,
        Kind::IntMat,
        Kind::BigIntMat,
        Kind::Map,
        Kind::List,
        Kind::String,
        Kind::Link,
        Kind::Resolution,
    ];

    /// Position in [`Kind::ALL`] and in the dispatch table
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Dispatch entry for this kind
    #[inline]
    pub fn dispatch(self) -> &'static DispatchEntry {
        &DISPATCH_TABLE[self.index()]
    }

    /// Check if values of this kind need an owning ring
    #[inline]
    pub fn is_ring_dependent(self) -> bool {
        self.dispatch().ring_dependent
    }

    /// Check if this kind is a ring or q-ring
    #[inline]
    pub fn is_ring(self) -> bool {
        matches!(self, Kind::Ring | Kind::QRing)
    }

    /// Tag for the mutable variant
    #[inline]
    pub const fn mutable(self) -> Tag {
        Tag { kind: self, immutable: false }
    }

    /// Tag for the immutable variant
    #[inline]
    pub const fn immutable(self) -> Tag {
        Tag { kind: self, immutable: true }
    }

    /// Short lowercase name
    pub fn name(self) -> &'static str {
        match self {
            Kind::Ring => "ring",
            Kind::QRing => "qring",
            Kind::Ideal => "ideal",
            Kind::Module => "module",
            Kind::Matrix => "matrix",
            Kind::Vector => "vector",
            Kind::Poly => "poly",
            Kind::Number => "number",
            Kind::BigInt => "bigint",
            Kind::Int => "int",
            Kind::IntVec => "intvec",
            Kind::IntMat => "intmat",
            Kind::BigIntMat => "bigintmat",
            Kind::Map => "map",
            Kind::List => "list",
            Kind::String => "string",
            Kind::Link => "link",
            Kind::Resolution => "resolution",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind paired with its mutability variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub kind: Kind,
    pub immutable: bool,
}

impl Tag {
    /// Decode a raw tag
    ///
    /// # Errors
    /// `UnknownKind` if the kind index is outside the enumeration.
    pub fn from_raw(raw: u32) -> Result<Self> {
        let index = (raw >> 1) as usize;
        let kind = Kind::ALL
            .get(index)
            .copied()
            .ok_or(FhbError::UnknownKind(raw))?;

        Ok(Tag {
            kind,
            immutable: raw & IMMUTABLE_BIT != 0,
        })
    }

    /// Encode as a raw tag
    pub fn into_raw(self) -> u32 {
        ((self.kind.index() as u32) << 1) | u32::from(self.immutable)
    }
}

impl From<Kind> for Tag {
    fn from(kind: Kind) -> Self {
        kind.mutable()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.immutable {
            write!(f, "{}_imm", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// Foreign teardown applied when a handle of a kind is finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Postpone destruction until the collection cycle has finished
    DeferRing,
    /// Numeric release; ring context passed when the handle has one
    ReleaseNumber,
    /// Ideal/module deletion with ring context
    DeleteIdeal,
    /// Polynomial matrix deletion with ring context
    DeleteMatrix,
    /// Polynomial/vector deletion with ring context
    DeletePoly,
    /// Map deletion (preimage name plus ideal body) with ring context
    DeleteMap,
    /// Integer vector/matrix destructor
    DeleteIntVec,
    /// Big-integer matrix destructor
    DeleteBigIntMat,
    /// Inline value, nothing allocated
    Nothing,
    /// Owned character buffer
    FreeString,
    /// Recursive element cleanup with ring context
    CleanList,
    /// Resolution computation-state teardown with ring context
    KillResolution,
    /// No teardown exists yet; the foreign object leaks
    Unimplemented,
}

impl Teardown {
    /// Check if this teardown needs a ring context
    pub fn needs_ring(self) -> bool {
        matches!(
            self,
            Teardown::DeleteIdeal
                | Teardown::DeleteMatrix
                | Teardown::DeletePoly
                | Teardown::DeleteMap
                | Teardown::CleanList
                | Teardown::KillResolution
        )
    }
}

/// Static per-kind metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchEntry {
    /// Values of this kind carry an owning ring
    pub ring_dependent: bool,
    /// Teardown applied on finalize
    pub teardown: Teardown,
}

const fn entry(ring_dependent: bool, teardown: Teardown) -> DispatchEntry {
    DispatchEntry {
        ring_dependent,
        teardown,
    }
}

/// Dispatch table indexed by [`Kind::index`]
pub static DISPATCH_TABLE: [DispatchEntry; Kind::COUNT] = [
    entry(false, Teardown::DeferRing),       // ring
    entry(false, Teardown::DeferRing),       // qring
    entry(true, Teardown::DeleteIdeal),      // ideal
    entry(true, Teardown::DeleteIdeal),      // module
    entry(true, Teardown::DeleteMatrix),     // matrix
    entry(true, Teardown::DeletePoly),       // vector
    entry(true, Teardown::DeletePoly),       // poly
    entry(true, Teardown::ReleaseNumber),    // number
    entry(false, Teardown::ReleaseNumber),   // bigint
    entry(false, Teardown::Nothing),         // int
    entry(false, Teardown::DeleteIntVec),    // intvec
    entry(false, Teardown::DeleteIntVec),    // intmat
    entry(false, Teardown::DeleteBigIntMat), // bigintmat
    entry(true, Teardown::DeleteMap),        // map
    entry(true, Teardown::CleanList),        // list
    entry(false, Teardown::FreeString),      // string
    entry(false, Teardown::Unimplemented),   // link
    entry(true, Teardown::KillResolution),   // resolution
];
