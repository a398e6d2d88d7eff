//! Test Utilities for the FHB Lifecycle Test Suite
//!
//! Provides a scripted foreign library that records every teardown call and
//! a fixture wiring it to a [`HandleHeap`]. The assertion helpers are strict:
//! a single double free or missing destruction fails the test.

#![allow(dead_code)]

use fhb::{Bridge, BridgeConfig, ForeignLibrary, ForeignPtr, HandleHeap, HandleRef, Kind};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// ============================================================================
/// SCRIPTED FOREIGN LIBRARY
/// ============================================================================

/// One recorded teardown call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destruction {
    pub op: &'static str,
    pub ptr: ForeignPtr,
    pub ring: Option<ForeignPtr>,
}

/// Foreign library double
///
/// Resident byte readings are taken from a script first, then from a fixed
/// fallback value.
#[derive(Default)]
pub struct ScriptedLibrary {
    log: Mutex<Vec<Destruction>>,
    readings: Mutex<VecDeque<usize>>,
    fallback_bytes: AtomicUsize,
    reads: AtomicUsize,
}

impl ScriptedLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue resident byte readings
    pub fn script(&self, readings: &[usize]) {
        self.readings.lock().extend(readings.iter().copied());
    }

    /// Readings left in the script
    pub fn pending_readings(&self) -> usize {
        self.readings.lock().len()
    }

    pub fn set_bytes(&self, bytes: usize) {
        self.fallback_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Number of resident byte queries so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<Destruction> {
        self.log.lock().clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.log.lock().iter().map(|d| d.op).collect()
    }

    pub fn destroyed(&self) -> Vec<ForeignPtr> {
        self.log.lock().iter().map(|d| d.ptr).collect()
    }

    fn record(&self, op: &'static str, ptr: ForeignPtr, ring: Option<ForeignPtr>) {
        self.log.lock().push(Destruction { op, ptr, ring });
    }
}

impl ForeignLibrary for ScriptedLibrary {
    fn resident_bytes(&self) -> usize {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.readings
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback_bytes.load(Ordering::SeqCst))
    }

    fn kill_ring(&self, ring: ForeignPtr) {
        self.record("kill_ring", ring, None);
    }

    fn release_number(&self, number: ForeignPtr, ring: Option<ForeignPtr>) {
        self.record("release_number", number, ring);
    }

    fn delete_ideal(&self, ideal: ForeignPtr, ring: ForeignPtr) {
        self.record("delete_ideal", ideal, Some(ring));
    }

    fn delete_matrix(&self, matrix: ForeignPtr, ring: ForeignPtr) {
        self.record("delete_matrix", matrix, Some(ring));
    }

    fn delete_poly(&self, poly: ForeignPtr, ring: ForeignPtr) {
        self.record("delete_poly", poly, Some(ring));
    }

    fn delete_map(&self, map: ForeignPtr, ring: ForeignPtr) {
        self.record("delete_map", map, Some(ring));
    }

    fn clean_list(&self, list: ForeignPtr, ring: ForeignPtr) {
        self.record("clean_list", list, Some(ring));
    }

    fn kill_resolution(&self, resolution: ForeignPtr, ring: ForeignPtr) {
        self.record("kill_resolution", resolution, Some(ring));
    }

    fn delete_int_vec(&self, intvec: ForeignPtr) {
        self.record("delete_int_vec", intvec, None);
    }

    fn delete_bigint_mat(&self, matrix: ForeignPtr) {
        self.record("delete_bigint_mat", matrix, None);
    }

    fn free_string(&self, string: ForeignPtr) {
        self.record("free_string", string, None);
    }

    fn kill_attributes(&self, attributes: ForeignPtr, ring: Option<ForeignPtr>) {
        self.record("kill_attributes", attributes, ring);
    }
}

/// ============================================================================
/// BRIDGE FIXTURE
/// ============================================================================

/// Installed bridge over a scripted library and a fresh heap
pub struct BridgeFixture {
    pub heap: HandleHeap,
    pub bridge: Arc<Bridge<ScriptedLibrary>>,
    next_ptr: AtomicUsize,
}

impl BridgeFixture {
    pub fn with_defaults() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let heap = HandleHeap::new();
        let bridge = Arc::new(
            Bridge::new(ScriptedLibrary::new(), config)
                .expect("bridge initialization should succeed with valid config"),
        );
        bridge.install(&heap);

        Self {
            heap,
            bridge,
            next_ptr: AtomicUsize::new(0x1000),
        }
    }

    pub fn lib(&self) -> &ScriptedLibrary {
        self.bridge.library()
    }

    /// Unique foreign address
    pub fn fresh_ptr(&self) -> ForeignPtr {
        ForeignPtr::new(self.next_ptr.fetch_add(0x10, Ordering::SeqCst))
    }

    /// Wrap a new rooted immutable ring
    pub fn rooted_ring(&self) -> (HandleRef, ForeignPtr) {
        let ptr = self.fresh_ptr();
        let ring = self
            .bridge
            .wrap_ring(&self.heap, Kind::Ring.immutable(), ptr)
            .expect("ring wrap should succeed");
        self.heap.root(ring);
        (ring, ptr)
    }

    /// Wrap a fresh ring-dependent object
    pub fn dependent(&self, kind: Kind, ring: HandleRef) -> (HandleRef, ForeignPtr) {
        let ptr = self.fresh_ptr();
        let handle = self
            .bridge
            .wrap_with_ring(&self.heap, kind, ptr, ring)
            .expect("ring-dependent wrap should succeed");
        (handle, ptr)
    }

    /// Wrap a fresh ring-free object
    pub fn plain(&self, kind: Kind) -> (HandleRef, ForeignPtr) {
        let ptr = self.fresh_ptr();
        let handle = self
            .bridge
            .wrap(&self.heap, kind, ptr)
            .expect("plain wrap should succeed");
        (handle, ptr)
    }
}

/// ============================================================================
/// STRICT ASSERTION HELPERS
/// ============================================================================

/// Assert that no foreign pointer was destroyed twice
///
/// **Tolerance:** ZERO - any repeat is a double free
#[track_caller]
pub fn assert_no_double_free(lib: &ScriptedLibrary, context: &str) {
    let mut seen = HashSet::new();
    for entry in lib.log() {
        assert!(
            seen.insert(entry.ptr),
            "{}: {} destroyed twice (second call: {})",
            context,
            entry.ptr,
            entry.op
        );
    }
}

/// Assert that exactly `expected` was destroyed, each pointer once
#[track_caller]
pub fn assert_destroyed_exactly(lib: &ScriptedLibrary, expected: &HashSet<ForeignPtr>, context: &str) {
    assert_no_double_free(lib, context);

    let destroyed: HashSet<ForeignPtr> = lib.destroyed().into_iter().collect();
    let missing: Vec<_> = expected.difference(&destroyed).collect();
    let unexpected: Vec<_> = destroyed.difference(expected).collect();

    assert!(
        missing.is_empty() && unexpected.is_empty(),
        "{}: {} never destroyed, {} destroyed without a handle ({:?} / {:?})",
        context,
        missing.len(),
        unexpected.len(),
        missing,
        unexpected
    );
}

/// Assert that every ring is destroyed after all teardowns that used it as context
#[track_caller]
pub fn assert_rings_outlive_dependents(lib: &ScriptedLibrary, context: &str) {
    let log = lib.log();
    let killed_at: HashMap<ForeignPtr, usize> = log
        .iter()
        .enumerate()
        .filter(|(_, d)| d.op == "kill_ring")
        .map(|(i, d)| (d.ptr, i))
        .collect();

    for (i, entry) in log.iter().enumerate() {
        if let Some(ring) = entry.ring {
            if let Some(&killed) = killed_at.get(&ring) {
                assert!(
                    i < killed,
                    "{}: {} {} used ring {} after it was destroyed",
                    context,
                    entry.op,
                    entry.ptr,
                    ring
                );
            }
        }
    }
}
