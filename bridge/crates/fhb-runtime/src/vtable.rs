//! C Function Tables
//!
//! A C host hands the runtime two tables of function pointers at
//! initialisation: one for its collector, one for the foreign library.
//! The adapters here implement the bridge's [`HostCollector`] and
//! [`ForeignLibrary`] traits on top of them.
//!
//! Handle payloads stored in host bags are `Arc<TaggedHandle>` raw pointers
//! produced by [`Arc::into_raw`]; ownership returns to Rust in `fhb_finalize`.

use fhb::{
    CollectionMode, FinalizeCallback, ForeignLibrary, ForeignPtr, HandleRef, HostCollector,
    MarkCallback, PostCollectionHook, TaggedHandle,
};
use libc::{c_void, size_t};
use std::sync::Arc;

/// Collector entry points supplied by the C host
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FhbHostVTable {
    /// Run a synchronous collection; `full` selects a full collection.
    /// Returns false if the host declined, e.g. while already collecting
    pub collect: extern "C" fn(full: bool) -> bool,
    /// Allocate a bag holding `payload` and return its reference; must not collect
    pub new_bag: extern "C" fn(payload: *const c_void) -> u64,
    /// Payload of a live bag, or null
    pub bag_payload: extern "C" fn(bag: u64) -> *const c_void,
    /// Post-collection behavior to run after the deferred drain
    pub previous_post_collection: Option<extern "C" fn()>,
}

/// Foreign library entry points; null ring arguments mean "no ring"
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FhbForeignVTable {
    pub resident_bytes: extern "C" fn() -> size_t,
    pub kill_ring: extern "C" fn(ring: *mut c_void),
    pub release_number: extern "C" fn(number: *mut c_void, ring: *mut c_void),
    pub delete_ideal: extern "C" fn(ideal: *mut c_void, ring: *mut c_void),
    pub delete_matrix: extern "C" fn(matrix: *mut c_void, ring: *mut c_void),
    pub delete_poly: extern "C" fn(poly: *mut c_void, ring: *mut c_void),
    pub delete_map: extern "C" fn(map: *mut c_void, ring: *mut c_void),
    pub clean_list: extern "C" fn(list: *mut c_void, ring: *mut c_void),
    pub kill_resolution: extern "C" fn(resolution: *mut c_void, ring: *mut c_void),
    pub delete_int_vec: extern "C" fn(intvec: *mut c_void),
    pub delete_bigint_mat: extern "C" fn(matrix: *mut c_void),
    pub free_string: extern "C" fn(string: *mut c_void),
    pub kill_attributes: extern "C" fn(attributes: *mut c_void, ring: *mut c_void),
}

#[inline]
fn raw(ptr: ForeignPtr) -> *mut c_void {
    ptr.addr() as *mut c_void
}

#[inline]
fn raw_opt(ptr: Option<ForeignPtr>) -> *mut c_void {
    ptr.map_or(std::ptr::null_mut(), raw)
}

/// [`ForeignLibrary`] over a C function table
pub struct CLibrary {
    table: FhbForeignVTable,
}

impl CLibrary {
    pub fn new(table: FhbForeignVTable) -> Self {
        Self { table }
    }
}

impl ForeignLibrary for CLibrary {
    fn resident_bytes(&self) -> usize {
        (self.table.resident_bytes)()
    }

    fn kill_ring(&self, ring: ForeignPtr) {
        (self.table.kill_ring)(raw(ring))
    }

    fn release_number(&self, number: ForeignPtr, ring: Option<ForeignPtr>) {
        (self.table.release_number)(raw(number), raw_opt(ring))
    }

    fn delete_ideal(&self, ideal: ForeignPtr, ring: ForeignPtr) {
        (self.table.delete_ideal)(raw(ideal), raw(ring))
    }

    fn delete_matrix(&self, matrix: ForeignPtr, ring: ForeignPtr) {
        (self.table.delete_matrix)(raw(matrix), raw(ring))
    }

    fn delete_poly(&self, poly: ForeignPtr, ring: ForeignPtr) {
        (self.table.delete_poly)(raw(poly), raw(ring))
    }

    fn delete_map(&self, map: ForeignPtr, ring: ForeignPtr) {
        (self.table.delete_map)(raw(map), raw(ring))
    }

    fn clean_list(&self, list: ForeignPtr, ring: ForeignPtr) {
        (self.table.clean_list)(raw(list), raw(ring))
    }

    fn kill_resolution(&self, resolution: ForeignPtr, ring: ForeignPtr) {
        (self.table.kill_resolution)(raw(resolution), raw(ring))
    }

    fn delete_int_vec(&self, intvec: ForeignPtr) {
        (self.table.delete_int_vec)(raw(intvec))
    }

    fn delete_bigint_mat(&self, matrix: ForeignPtr) {
        (self.table.delete_bigint_mat)(raw(matrix))
    }

    fn free_string(&self, string: ForeignPtr) {
        (self.table.free_string)(raw(string))
    }

    fn kill_attributes(&self, attributes: ForeignPtr, ring: Option<ForeignPtr>) {
        (self.table.kill_attributes)(raw(attributes), raw_opt(ring))
    }
}

/// [`HostCollector`] over a C function table
///
/// The C host drives finalize, mark and the post-collection hook itself
/// through the exported `fhb_*` functions, so callback registration only
/// records that it happened.
pub struct CHost {
    table: FhbHostVTable,
}

impl CHost {
    pub fn new(table: FhbHostVTable) -> Self {
        Self { table }
    }
}

impl HostCollector for CHost {
    fn collect(&self, mode: CollectionMode) -> bool {
        (self.table.collect)(mode == CollectionMode::Full)
    }

    fn adopt(&self, handle: TaggedHandle) -> HandleRef {
        let payload = Arc::into_raw(Arc::new(handle)) as *const c_void;
        HandleRef::from_raw((self.table.new_bag)(payload))
    }

    fn resolve(&self, handle: HandleRef) -> Option<Arc<TaggedHandle>> {
        let payload = (self.table.bag_payload)(handle.into_raw()) as *const TaggedHandle;
        if payload.is_null() {
            return None;
        }
        // SAFETY: a live bag's payload came from `Arc::into_raw` in `adopt` and
        // its count is only released by `fhb_finalize`, after the bag is dead.
        unsafe {
            Arc::increment_strong_count(payload);
            Some(Arc::from_raw(payload))
        }
    }

    fn register_finalizer(&self, _callback: Arc<dyn FinalizeCallback>) {
        log::debug!("finalize callback is driven by fhb_finalize");
    }

    fn register_marker(&self, _callback: Arc<dyn MarkCallback>) {
        log::debug!("mark callback is driven by fhb_mark");
    }

    fn replace_post_collection_hook(&self, _hook: PostCollectionHook) -> Option<PostCollectionHook> {
        self.table
            .previous_post_collection
            .map(|previous| -> PostCollectionHook { Arc::new(move || previous()) })
    }
}
