//! Foreign Library Interface
//!
//! Teardown entry points and allocator statistics of the foreign library.
//! Every destruction call is infallible at this layer. Ring-context
//! arguments are the foreign pointer of the owning ring.

use crate::handle::ForeignPtr;

/// Manually managed foreign heap
pub trait ForeignLibrary: Send + Sync {
    /// Bytes currently resident in the foreign allocator
    fn resident_bytes(&self) -> usize;

    /// Destroy a ring or q-ring
    fn kill_ring(&self, ring: ForeignPtr);

    /// Release a number; big integers carry no ring
    fn release_number(&self, number: ForeignPtr, ring: Option<ForeignPtr>);

    /// Delete an ideal or module
    fn delete_ideal(&self, ideal: ForeignPtr, ring: ForeignPtr);

    /// Delete a polynomial matrix
    fn delete_matrix(&self, matrix: ForeignPtr, ring: ForeignPtr);

    /// Delete a polynomial or vector
    fn delete_poly(&self, poly: ForeignPtr, ring: ForeignPtr);

    /// Delete a map, including its preimage name
    fn delete_map(&self, map: ForeignPtr, ring: ForeignPtr);

    /// Recursively clean a list and its elements
    fn clean_list(&self, list: ForeignPtr, ring: ForeignPtr);

    /// Tear down resolution computation state
    fn kill_resolution(&self, resolution: ForeignPtr, ring: ForeignPtr);

    /// Destroy an integer vector or integer matrix
    fn delete_int_vec(&self, intvec: ForeignPtr);

    /// Destroy a big-integer matrix
    fn delete_bigint_mat(&self, matrix: ForeignPtr);

    /// Free an owned string buffer
    fn free_string(&self, string: ForeignPtr);

    /// Tear down attribute metadata attached to a handle
    fn kill_attributes(&self, attributes: ForeignPtr, ring: Option<ForeignPtr>);
}
