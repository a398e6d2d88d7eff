//! Error Module - FHB Error Types
//!
//! Defines all error types used by the bridge.
//!
//! Every error in this crate is an invariant violation rather than a
//! transient condition, so nothing here is ever retried.
//!
//! # Error Categories
//!
//! ## Construction Errors
//! - `DuplicateWrap` - Foreign ring already owned by a live handle
//! - `RingDependencyMismatch` - Wrong constructor for the kind
//! - `NotARing` - Ring argument does not wrap a ring or q-ring
//!
//! ## Lookup Errors
//! - `DanglingHandle` - Host reference no longer resolves
//! - `NoAssociatedRing` - Kind has no owning ring
//!
//! ## Internal Errors
//! - `UnknownKind` - Raw tag outside the closed kind enumeration
//! - `Configuration` - Invalid configuration
//! - `Internal` - Broken internal invariant

use crate::handle::{ForeignPtr, HandleRef};
use crate::kind::Kind;
use thiserror::Error;

/// Main error type for all FHB operations
///
/// # Examples
///
/// ```rust
/// use fhb::error::FhbError;
///
/// fn report(err: &FhbError) {
///     match err {
///         FhbError::DuplicateWrap { ring, existing } => {
///             eprintln!("ring {} already wrapped by {}", ring, existing);
///         }
///         other => eprintln!("bridge error: {}", other),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum FhbError {
    /// Foreign ring already wrapped
    ///
    /// **When returned:** `wrap_ring` is called for a foreign ring pointer
    /// that the registry already maps to a handle.
    ///
    /// **Recovery strategy:** None - the requested construction is aborted
    /// and the existing owner is left untouched.
    #[error("Foreign ring {ring} already has a host wrapper ({existing})")]
    DuplicateWrap { ring: ForeignPtr, existing: HandleRef },

    /// Raw tag outside the kind enumeration
    ///
    /// **When returned:** A raw tag received over the C ABI does not decode
    /// to any known kind.
    ///
    /// **Recovery strategy:** Cannot recover - indicates memory corruption
    /// or a missing dispatch-table entry.
    #[error("Unknown kind tag: {0:#x}")]
    UnknownKind(u32),

    /// Constructor does not match the ring dependency of the kind
    ///
    /// **When returned:** `wrap` called with a ring-dependent kind,
    /// `wrap_with_ring` with a ring-free kind, or `wrap_ring` with a kind
    /// that is not a ring.
    #[error("Kind {kind} cannot be wrapped this way (ring-dependent: {ring_dependent})")]
    RingDependencyMismatch { kind: Kind, ring_dependent: bool },

    /// Ring argument does not wrap a ring
    #[error("Handle {handle} wraps a {kind}, expected a ring or q-ring")]
    NotARing { handle: HandleRef, kind: Kind },

    /// Kind has no owning ring
    #[error("Kind {kind} has no associated ring")]
    NoAssociatedRing { kind: Kind },

    /// Host reference does not resolve to a live handle
    #[error("Dangling handle reference: {0}")]
    DanglingHandle(HandleRef),

    /// Configuration error
    ///
    /// **When returned:** Invalid bridge configuration detected
    ///
    /// **Recovery strategy:** Use default configuration or fail fast
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error - indicates a bug in FHB
    ///
    /// **Action required:** Report to developers with full context
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FhbError {
    /// Check if this error indicates a bug in the bridge itself
    pub fn is_bug(&self) -> bool {
        matches!(self, FhbError::UnknownKind(_) | FhbError::Internal(_))
    }

    /// Check if this error must abort the surrounding host operation
    ///
    /// Duplicate wraps and unknown kinds are fatal: the host is expected to
    /// raise them as hard errors rather than continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FhbError::DuplicateWrap { .. } | FhbError::UnknownKind(_) | FhbError::Internal(_)
        )
    }
}

impl From<crate::config::ConfigError> for FhbError {
    fn from(err: crate::config::ConfigError) -> Self {
        FhbError::Configuration(err.to_string())
    }
}

/// Result type alias for FHB operations
pub type Result<T> = std::result::Result<T, FhbError>;

/// Ensure condition is true, otherwise return error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
