//! Finalizer Dispatch
//!
//! Maps an unreachable handle to the foreign teardown of its kind. Runs
//! during the host's sweep, so it must not allocate host objects, trigger a
//! collection or touch the foreign library's current ring. Rings are only
//! handed back to the caller for deferral.

use crate::error::{FhbError, Result};
use crate::foreign::ForeignLibrary;
use crate::handle::{ForeignPtr, TaggedHandle};
use crate::kind::Teardown;

/// What finalize did with the foreign object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    /// Destroyed immediately
    Destroyed,
    /// Ring pointer must be queued for post-collection destruction
    Deferred(ForeignPtr),
    /// Inline value, nothing to free
    Inline,
    /// No teardown exists for the kind
    Leaked,
}

/// Tear down attributes, then the foreign object of `handle`
///
/// # Errors
/// `Internal` if a ring-context teardown finds no owning ring.
pub fn dispose<L>(library: &L, handle: &TaggedHandle) -> Result<Disposal>
where
    L: ForeignLibrary + ?Sized,
{
    let ring = handle.ring_context();
    let ptr = handle.foreign();

    if let Some(attrs) = handle.replace_attributes(None) {
        library.kill_attributes(attrs, ring);
    }

    let teardown = handle.kind().dispatch().teardown;
    let context = || {
        ring.ok_or_else(|| {
            FhbError::Internal(format!("{} {} has no ring context", handle.kind(), ptr))
        })
    };

    match teardown {
        Teardown::DeferRing => return Ok(Disposal::Deferred(ptr)),
        Teardown::ReleaseNumber => library.release_number(ptr, ring),
        Teardown::DeleteIdeal => library.delete_ideal(ptr, context()?),
        Teardown::DeleteMatrix => library.delete_matrix(ptr, context()?),
        Teardown::DeletePoly => library.delete_poly(ptr, context()?),
        Teardown::DeleteMap => library.delete_map(ptr, context()?),
        Teardown::CleanList => library.clean_list(ptr, context()?),
        Teardown::KillResolution => library.kill_resolution(ptr, context()?),
        Teardown::DeleteIntVec => library.delete_int_vec(ptr),
        Teardown::DeleteBigIntMat => library.delete_bigint_mat(ptr),
        Teardown::FreeString => library.free_string(ptr),
        Teardown::Nothing => return Ok(Disposal::Inline),
        Teardown::Unimplemented => return Ok(Disposal::Leaked),
    }

    Ok(Disposal::Destroyed)
}
