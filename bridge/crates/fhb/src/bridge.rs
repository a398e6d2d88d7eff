//! Bridge - Lifecycle Context
//!
//! [`Bridge`] owns all mutable bridge state: the deferred ring queue, the
//! pressure monitor and the ring registry. A host creates one per process
//! (tests create as many as they like) and installs it into its collector.
//!
//! # Handle Lifecycle
//!
//! ```text
//! wrap*()                       host collector                  post hook
//!   │ relieve_pressure()          │                               │
//!   │   └─ maybe collect ───────▶ │                               │
//!   │ adopt(handle) ────────────▶ │ unreachable                   │
//!   │                             │  └─ finalize ─┬─ destroy now  │
//!   │                             │               └─ defer ring ─▶│ drain_deferred()
//!   │                             │                               │  └─ previous hook
//! ```
//!
//! Construction consults the pressure monitor before the host allocates, so
//! every `wrap*` call may run a full collection cycle (including the drain)
//! before it returns. The monitor lock is never held across that collection.

use crate::config::BridgeConfig;
use crate::deferred::DeferredQueue;
use crate::error::{FhbError, Result};
use crate::finalizer::{self, Disposal};
use crate::foreign::ForeignLibrary;
use crate::handle::{ForeignPtr, HandleRef, MarkRefs, RingBinding, RingConstants, TaggedHandle};
use crate::host::{FinalizeCallback, HostCollector, MarkCallback, PostCollectionHook};
use crate::kind::Tag;
use crate::logging::{self, BridgeEvent};
use crate::pressure::{PressureMonitor, PressureOutcome, PressureState};
use crate::registry::RingRegistry;
use crate::stats::{BridgeMetrics, BridgeStats, StatsTimer};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Lifecycle bridge between a host collector and a foreign library
///
/// # Examples
///
/// ```rust
/// use fhb::{Bridge, BridgeConfig, HandleHeap, Kind};
/// # use fhb::{ForeignLibrary, ForeignPtr};
/// # struct Lib;
/// # impl ForeignLibrary for Lib {
/// #     fn resident_bytes(&self) -> usize { 0 }
/// #     fn kill_ring(&self, _: ForeignPtr) {}
/// #     fn release_number(&self, _: ForeignPtr, _: Option<ForeignPtr>) {}
/// #     fn delete_ideal(&self, _: ForeignPtr, _: ForeignPtr) {}
/// #     fn delete_matrix(&self, _: ForeignPtr, _: ForeignPtr) {}
/// #     fn delete_poly(&self, _: ForeignPtr, _: ForeignPtr) {}
/// #     fn delete_map(&self, _: ForeignPtr, _: ForeignPtr) {}
/// #     fn clean_list(&self, _: ForeignPtr, _: ForeignPtr) {}
/// #     fn kill_resolution(&self, _: ForeignPtr, _: ForeignPtr) {}
/// #     fn delete_int_vec(&self, _: ForeignPtr) {}
/// #     fn delete_bigint_mat(&self, _: ForeignPtr) {}
/// #     fn free_string(&self, _: ForeignPtr) {}
/// #     fn kill_attributes(&self, _: ForeignPtr, _: Option<ForeignPtr>) {}
/// # }
///
/// let heap = HandleHeap::new();
/// let bridge = std::sync::Arc::new(Bridge::new(Lib, BridgeConfig::default())?);
/// bridge.install(&heap);
///
/// let ring = bridge.wrap_ring(&heap, Kind::Ring.immutable(), ForeignPtr::new(0x1000))?;
/// let poly = bridge.wrap_with_ring(&heap, Kind::Poly, ForeignPtr::new(0x2000), ring)?;
/// assert_eq!(bridge.ring_of(&heap, poly)?, ring);
/// # Ok::<(), fhb::FhbError>(())
/// ```
pub struct Bridge<L: ForeignLibrary> {
    library: L,
    config: BridgeConfig,
    deferred: Mutex<DeferredQueue>,
    pressure: Mutex<PressureMonitor>,
    registry: Mutex<RingRegistry>,
    previous_hook: Mutex<Option<PostCollectionHook>>,
    stats: Arc<BridgeStats>,
    installed: AtomicBool,
}

impl<L: ForeignLibrary> Bridge<L> {
    /// Create a bridge over `library`
    ///
    /// # Errors
    /// `Configuration` if `config` does not validate.
    pub fn new(library: L, config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            library,
            deferred: Mutex::new(DeferredQueue::with_capacity(config.deferred_initial_capacity)),
            pressure: Mutex::new(PressureMonitor::new(&config)),
            registry: Mutex::new(RingRegistry::new()),
            previous_hook: Mutex::new(None),
            stats: Arc::new(BridgeStats::new()),
            installed: AtomicBool::new(false),
            config,
        })
    }

    /// Register callbacks and chain the post-collection hook
    ///
    /// Only the first call has an effect.
    pub fn install<H>(self: &Arc<Self>, host: &H)
    where
        L: 'static,
        H: HostCollector + ?Sized,
    {
        if self.installed.swap(true, Ordering::AcqRel) {
            log::debug!("bridge already installed");
            return;
        }

        host.register_finalizer(self.clone());
        host.register_marker(self.clone());

        let bridge = Arc::clone(self);
        let hook: PostCollectionHook = Arc::new(move || bridge.after_collection());
        let previous = host.replace_post_collection_hook(hook);
        *self.previous_hook.lock() = previous;
    }

    /// Check if `install` has run
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    // ========================================================================
    // CONSTRUCTION
    // ========================================================================

    /// Wrap a foreign object whose kind has no owning ring
    pub fn wrap<H>(&self, host: &H, tag: impl Into<Tag>, foreign: ForeignPtr) -> Result<HandleRef>
    where
        H: HostCollector + ?Sized,
    {
        let tag = tag.into();
        crate::ensure!(
            !tag.kind.is_ring_dependent() && !tag.kind.is_ring(),
            FhbError::RingDependencyMismatch {
                kind: tag.kind,
                ring_dependent: tag.kind.is_ring_dependent(),
            }
        );

        self.relieve_pressure(host);
        let handle = host.adopt(TaggedHandle::plain(tag, foreign));
        self.record(|stats| stats.record_wrap(false));
        Ok(handle)
    }

    /// Wrap a foreign object that lives in `ring`
    ///
    /// # Errors
    /// - `RingDependencyMismatch` if the kind is not ring-dependent
    /// - `DanglingHandle` if `ring` is not live
    /// - `NotARing` if `ring` does not wrap a ring or q-ring
    pub fn wrap_with_ring<H>(
        &self,
        host: &H,
        tag: impl Into<Tag>,
        foreign: ForeignPtr,
        ring: HandleRef,
    ) -> Result<HandleRef>
    where
        H: HostCollector + ?Sized,
    {
        let tag = tag.into();
        crate::ensure!(
            tag.kind.is_ring_dependent(),
            FhbError::RingDependencyMismatch {
                kind: tag.kind,
                ring_dependent: false,
            }
        );

        // Held until adoption so a triggered collection cannot reclaim the ring.
        let ring_handle = self.resolve_ring(host, ring)?;
        let binding = RingBinding {
            handle: ring,
            context: ring_handle.foreign(),
        };

        self.relieve_pressure(host);
        let handle = host.adopt(TaggedHandle::with_ring(tag, foreign, binding));
        drop(ring_handle);

        self.record(|stats| stats.record_wrap(false));
        Ok(handle)
    }

    /// Wrap a foreign ring or q-ring
    ///
    /// # Errors
    /// - `RingDependencyMismatch` if the kind is not a ring
    /// - `DuplicateWrap` if the ring already has an owner; nothing is allocated
    pub fn wrap_ring<H>(&self, host: &H, tag: impl Into<Tag>, ring: ForeignPtr) -> Result<HandleRef>
    where
        H: HostCollector + ?Sized,
    {
        let tag = tag.into();
        crate::ensure!(
            tag.kind.is_ring(),
            FhbError::RingDependencyMismatch {
                kind: tag.kind,
                ring_dependent: tag.kind.is_ring_dependent(),
            }
        );

        self.reject_owned(ring)?;
        self.relieve_pressure(host);

        // The collection may have run host code that wrapped the same ring.
        let mut registry = self.registry.lock();
        if let Err(err) = registry.check_unowned(ring) {
            drop(registry);
            return Err(self.duplicate_wrap(err));
        }
        let handle = host.adopt(TaggedHandle::for_ring(tag, ring));
        registry.insert(ring, handle);
        drop(registry);

        self.record(|stats| stats.record_wrap(true));
        Ok(handle)
    }

    /// Run a collection if foreign memory exceeds the threshold
    ///
    /// Returns the firing, or `None` if the reading was within bounds.
    pub fn relieve_pressure<H>(&self, host: &H) -> Option<PressureOutcome>
    where
        H: HostCollector + ?Sized,
    {
        let bytes_before = self.library.resident_bytes();
        let mode = {
            let monitor = self.pressure.lock();
            if !monitor.needs_collection(bytes_before) {
                return None;
            }
            monitor.next_mode()
        };

        let timer = StatsTimer::start();
        if !host.collect(mode) {
            log::debug!("{} collection for foreign pressure declined by host", mode);
            return None;
        }
        let elapsed = timer.elapsed();

        let bytes_after = self.library.resident_bytes();
        let (counter, old_threshold, threshold_bytes) = {
            let mut monitor = self.pressure.lock();
            monitor.plan();
            let old = monitor.threshold_bytes();
            (monitor.counter(), old, monitor.settle(bytes_after))
        };

        log::debug!(
            "{} collection for foreign pressure: {} -> {} bytes, threshold {}",
            mode,
            bytes_before,
            bytes_after,
            threshold_bytes
        );
        self.record(|stats| stats.record_collection(mode, elapsed));
        self.emit(BridgeEvent::CollectionTriggered {
            mode,
            bytes_before,
            bytes_after,
            counter,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
        });
        self.emit(BridgeEvent::ThresholdTuned {
            old_bytes: old_threshold,
            new_bytes: threshold_bytes,
        });

        Some(PressureOutcome {
            mode,
            bytes_before,
            bytes_after,
            threshold_bytes,
        })
    }

    // ========================================================================
    // FLAGS AND CACHES
    // ========================================================================

    /// Mark a handle immutable
    ///
    /// Returns `true` if the flag changed.
    pub fn make_immutable<H>(&self, host: &H, handle: HandleRef) -> Result<bool>
    where
        H: HostCollector + ?Sized,
    {
        Ok(self.resolve(host, handle)?.set_immutable())
    }

    pub fn is_mutable<H>(&self, host: &H, handle: HandleRef) -> Result<bool>
    where
        H: HostCollector + ?Sized,
    {
        Ok(!self.resolve(host, handle)?.is_immutable())
    }

    /// Cache the zero element of a ring if none is cached yet
    ///
    /// Returns the cached element, which is the first one ever stored.
    pub fn cache_zero<H>(&self, host: &H, ring: HandleRef, value: HandleRef) -> Result<HandleRef>
    where
        H: HostCollector + ?Sized,
    {
        self.cache_constant(host, ring, value, |c| &c.zero)
    }

    /// Cache the one element of a ring if none is cached yet
    pub fn cache_one<H>(&self, host: &H, ring: HandleRef, value: HandleRef) -> Result<HandleRef>
    where
        H: HostCollector + ?Sized,
    {
        self.cache_constant(host, ring, value, |c| &c.one)
    }

    fn cache_constant<H>(
        &self,
        host: &H,
        ring: HandleRef,
        value: HandleRef,
        slot: fn(&RingConstants) -> &OnceLock<HandleRef>,
    ) -> Result<HandleRef>
    where
        H: HostCollector + ?Sized,
    {
        let ring_handle = self.resolve(host, ring)?;
        let constants = ring_handle.constants().ok_or(FhbError::NotARing {
            handle: ring,
            kind: ring_handle.kind(),
        })?;
        let value_handle = self.resolve(host, value)?;

        let cached = slot(constants).get_or_init(|| {
            value_handle.set_immutable();
            value
        });
        Ok(*cached)
    }

    /// Zero element of the structure `handle` belongs to
    ///
    /// - immutable ring: cached, built with `make` on first use
    /// - immutable ring-dependent value: delegated to its ring
    /// - anything else: a fresh element from `make`
    ///
    /// `make` receives the handle the element is built for.
    pub fn zero_of<H, F>(&self, host: &H, handle: HandleRef, make: F) -> Result<HandleRef>
    where
        H: HostCollector + ?Sized,
        F: FnOnce(HandleRef) -> Result<HandleRef>,
    {
        self.constant_of(host, handle, make, |c| &c.zero)
    }

    /// One element of the structure `handle` belongs to
    pub fn one_of<H, F>(&self, host: &H, handle: HandleRef, make: F) -> Result<HandleRef>
    where
        H: HostCollector + ?Sized,
        F: FnOnce(HandleRef) -> Result<HandleRef>,
    {
        self.constant_of(host, handle, make, |c| &c.one)
    }

    fn constant_of<H, F>(
        &self,
        host: &H,
        handle: HandleRef,
        make: F,
        slot: fn(&RingConstants) -> &OnceLock<HandleRef>,
    ) -> Result<HandleRef>
    where
        H: HostCollector + ?Sized,
        F: FnOnce(HandleRef) -> Result<HandleRef>,
    {
        let resolved = self.resolve(host, handle)?;
        if !resolved.is_immutable() {
            return make(handle);
        }

        if let Some(constants) = resolved.constants() {
            if let Some(cached) = slot(constants).get() {
                return Ok(*cached);
            }
            let value = make(handle)?;
            return self.cache_constant(host, handle, value, slot);
        }

        let ring = resolved.ring().map(|binding| binding.handle);
        drop(resolved);
        match ring {
            Some(ring) => self.constant_of(host, ring, make, slot),
            None => make(handle),
        }
    }

    /// Attach foreign attribute metadata, tearing down any previous record
    pub fn attach_attributes<H>(&self, host: &H, handle: HandleRef, attrs: ForeignPtr) -> Result<()>
    where
        H: HostCollector + ?Sized,
    {
        let resolved = self.resolve(host, handle)?;
        if let Some(old) = resolved.replace_attributes(Some(attrs)) {
            self.library.kill_attributes(old, resolved.ring_context());
        }
        Ok(())
    }

    /// Owning ring of a handle; rings are their own ring
    ///
    /// # Errors
    /// `NoAssociatedRing` for kinds without a ring.
    pub fn ring_of<H>(&self, host: &H, handle: HandleRef) -> Result<HandleRef>
    where
        H: HostCollector + ?Sized,
    {
        let resolved = self.resolve(host, handle)?;
        if resolved.kind().is_ring() {
            return Ok(handle);
        }
        resolved
            .ring()
            .map(|binding| binding.handle)
            .ok_or(FhbError::NoAssociatedRing {
                kind: resolved.kind(),
            })
    }

    // ========================================================================
    // COLLECTOR CALLBACKS
    // ========================================================================

    /// Host references embedded in a handle
    pub fn mark_references(&self, handle: &TaggedHandle) -> MarkRefs {
        handle.references()
    }

    /// Release the foreign object of an unreachable handle
    ///
    /// Rings are queued; everything else is destroyed before this returns.
    pub fn finalize(&self, handle: &TaggedHandle) -> Result<Disposal> {
        let disposal = finalizer::dispose(&self.library, handle)?;

        match disposal {
            Disposal::Deferred(ring) => {
                let queued = {
                    let mut deferred = self.deferred.lock();
                    deferred.push(ring);
                    deferred.len()
                };
                self.record(|stats| stats.record_deferred());
                self.emit(BridgeEvent::RingDeferred { ring, queued });
            },
            Disposal::Leaked => {
                log::warn!("{} {} finalized without teardown", handle.kind(), handle.foreign());
                self.record(|stats| stats.record_leaked_link());
                self.emit(BridgeEvent::LinkLeaked {
                    link: handle.foreign(),
                });
            },
            Disposal::Destroyed | Disposal::Inline => {},
        }

        self.record(|stats| stats.record_finalize(disposal == Disposal::Destroyed));
        self.emit(BridgeEvent::Finalized {
            kind: handle.kind(),
            foreign: handle.foreign(),
        });
        Ok(disposal)
    }

    /// Destroy every queued ring in enqueue order
    ///
    /// Returns the number of rings destroyed. The queue keeps its capacity.
    pub fn drain_deferred(&self) -> usize {
        let timer = StatsTimer::start();
        let batch = self.deferred.lock().take_batch();

        for ring in &batch {
            self.library.kill_ring(*ring);
        }

        if !batch.is_empty() {
            let mut registry = self.registry.lock();
            for ring in &batch {
                registry.release(*ring);
            }
        }

        self.record(|stats| stats.record_drain(batch.len()));
        if !batch.is_empty() {
            log::debug!("drained {} deferred rings", batch.len());
            self.emit(BridgeEvent::DeferredDrained {
                destroyed: batch.len(),
                duration_us: timer.elapsed_us(),
            });
        }
        batch.len()
    }

    /// Post-collection hook body: drain, then the host's previous behavior
    pub fn after_collection(&self) {
        self.drain_deferred();

        let previous = self.previous_hook.lock().clone();
        if let Some(previous) = previous {
            previous();
        }
    }

    // ========================================================================
    // INTROSPECTION
    // ========================================================================

    /// Current foreign resident byte count
    pub fn foreign_bytes(&self) -> usize {
        self.library.resident_bytes()
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<BridgeStats> {
        Arc::clone(&self.stats)
    }

    pub fn pressure_state(&self) -> PressureState {
        self.pressure.lock().state()
    }

    /// Snapshot of counters and pressure state for export
    pub fn metrics(&self) -> BridgeMetrics {
        BridgeMetrics::from_summary(&self.stats.summary(), self.pressure_state())
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.lock().len()
    }

    /// Handle currently owning a foreign ring
    pub fn ring_owner(&self, ring: ForeignPtr) -> Option<HandleRef> {
        self.registry.lock().owner(ring)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn resolve<H>(&self, host: &H, handle: HandleRef) -> Result<Arc<TaggedHandle>>
    where
        H: HostCollector + ?Sized,
    {
        host.resolve(handle).ok_or(FhbError::DanglingHandle(handle))
    }

    fn resolve_ring<H>(&self, host: &H, ring: HandleRef) -> Result<Arc<TaggedHandle>>
    where
        H: HostCollector + ?Sized,
    {
        let resolved = self.resolve(host, ring)?;
        crate::ensure!(
            resolved.kind().is_ring(),
            FhbError::NotARing {
                handle: ring,
                kind: resolved.kind(),
            }
        );
        Ok(resolved)
    }

    fn reject_owned(&self, ring: ForeignPtr) -> Result<()> {
        let unowned = self.registry.lock().check_unowned(ring);
        unowned.map_err(|err| self.duplicate_wrap(err))
    }

    fn duplicate_wrap(&self, err: FhbError) -> FhbError {
        if let FhbError::DuplicateWrap { ring, existing } = &err {
            log::error!("foreign ring {} already wrapped by {}", ring, existing);
            self.record(|stats| stats.record_duplicate_wrap());
            self.emit(BridgeEvent::DuplicateWrap {
                ring: *ring,
                existing: *existing,
            });
        }
        err
    }

    fn record(&self, f: impl FnOnce(&BridgeStats)) {
        if self.config.stats_enabled {
            f(&self.stats);
        }
    }

    fn emit(&self, event: BridgeEvent) {
        if self.config.verbose {
            logging::log_event(event);
        }
    }
}

impl<L: ForeignLibrary> FinalizeCallback for Bridge<L> {
    fn finalize(&self, handle: &TaggedHandle) {
        if let Err(err) = Bridge::finalize(self, handle) {
            log::error!("finalize failed: {}", err);
        }
    }
}

impl<L: ForeignLibrary> MarkCallback for Bridge<L> {
    fn mark(&self, handle: &TaggedHandle) -> MarkRefs {
        self.mark_references(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign::mock::RecordingLibrary;
    use crate::heap::HandleHeap;
    use crate::host::CollectionMode;
    use crate::kind::Kind;

    fn setup() -> (HandleHeap, Arc<Bridge<RecordingLibrary>>) {
        let heap = HandleHeap::new();
        let bridge = Arc::new(Bridge::new(RecordingLibrary::new(), BridgeConfig::default()).unwrap());
        bridge.install(&heap);
        (heap, bridge)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = BridgeConfig {
            deferred_initial_capacity: 0,
            ..Default::default()
        };
        let err = Bridge::new(RecordingLibrary::new(), config).err().unwrap();
        assert!(matches!(err, FhbError::Configuration(_)));
    }

    #[test]
    fn test_wrong_constructor_rejected() {
        let (heap, bridge) = setup();
        let ring = bridge.wrap_ring(&heap, Kind::Ring, ForeignPtr::new(0x10)).unwrap();

        assert!(bridge.wrap(&heap, Kind::Poly, ForeignPtr::new(0x20)).is_err());
        assert!(bridge.wrap(&heap, Kind::Ring, ForeignPtr::new(0x21)).is_err());
        assert!(bridge
            .wrap_with_ring(&heap, Kind::BigInt, ForeignPtr::new(0x22), ring)
            .is_err());
        assert!(bridge.wrap_ring(&heap, Kind::Ideal, ForeignPtr::new(0x23)).is_err());
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_wrap_with_non_ring_rejected() {
        let (heap, bridge) = setup();
        let int = bridge.wrap(&heap, Kind::Int, ForeignPtr::new(3)).unwrap();

        let err = bridge
            .wrap_with_ring(&heap, Kind::Poly, ForeignPtr::new(0x20), int)
            .unwrap_err();
        assert!(matches!(err, FhbError::NotARing { kind: Kind::Int, .. }));
    }

    #[test]
    fn test_duplicate_ring_keeps_first_owner() {
        let (heap, bridge) = setup();
        let ptr = ForeignPtr::new(0x10);
        let first = bridge.wrap_ring(&heap, Kind::Ring, ptr).unwrap();

        let err = bridge.wrap_ring(&heap, Kind::QRing, ptr).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(bridge.ring_owner(ptr), Some(first));
        assert_eq!(bridge.stats().summary().duplicate_wraps, 1);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_ring_destroyed_only_after_drain() {
        let (heap, bridge) = setup();
        let ring_ptr = ForeignPtr::new(0x10);
        let ring = bridge.wrap_ring(&heap, Kind::Ring, ring_ptr).unwrap();
        bridge
            .wrap_with_ring(&heap, Kind::Poly, ForeignPtr::new(0x20), ring)
            .unwrap();

        heap.collect(CollectionMode::Full);

        assert_eq!(bridge.library().ops(), vec!["delete_poly", "kill_ring"]);
        assert_eq!(bridge.deferred_len(), 0);
        assert_eq!(bridge.ring_owner(ring_ptr), None);
    }

    #[test]
    fn test_ring_rewrap_after_destruction() {
        let (heap, bridge) = setup();
        let ptr = ForeignPtr::new(0x10);
        bridge.wrap_ring(&heap, Kind::Ring, ptr).unwrap();
        heap.collect(CollectionMode::Full);

        assert!(bridge.wrap_ring(&heap, Kind::Ring, ptr).is_ok());
    }

    #[test]
    fn test_previous_hook_runs_after_drain() {
        use std::sync::atomic::AtomicUsize;

        let heap = HandleHeap::new();
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let bridge = Arc::new(Bridge::new(RecordingLibrary::new(), BridgeConfig::default()).unwrap());

        let observer = Arc::clone(&bridge);
        let record = Arc::clone(&seen);
        heap.replace_post_collection_hook(Arc::new(move || {
            record.store(observer.library().calls().len(), Ordering::SeqCst);
        }));
        bridge.install(&heap);

        bridge.wrap_ring(&heap, Kind::Ring, ForeignPtr::new(0x10)).unwrap();
        heap.collect(CollectionMode::Full);

        // Previous behavior observed the ring already destroyed.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    /// Chain `hook` behind the bridge on a shared heap; it runs on the first collection only
    fn setup_with_hook<F>(hook: F) -> (Arc<HandleHeap>, Arc<Bridge<RecordingLibrary>>)
    where
        F: Fn(&HandleHeap, &Bridge<RecordingLibrary>) + Send + Sync + 'static,
    {
        let heap = Arc::new(HandleHeap::new());
        let bridge = Arc::new(Bridge::new(RecordingLibrary::new(), BridgeConfig::default()).unwrap());

        let weak_heap = Arc::downgrade(&heap);
        let weak_bridge = Arc::downgrade(&bridge);
        let fired = AtomicBool::new(false);
        heap.replace_post_collection_hook(Arc::new(move || {
            if fired.swap(true, Ordering::SeqCst) {
                return;
            }
            if let (Some(heap), Some(bridge)) = (weak_heap.upgrade(), weak_bridge.upgrade()) {
                hook(&heap, &bridge);
            }
        }));
        bridge.install(&*heap);
        (heap, bridge)
    }

    /// Host code chained after the drain wraps the same ring while the
    /// outer wrap is collecting for pressure.
    ///
    /// **Bug this finds:** two handles owning one ring, destroyed twice.
    #[test]
    fn test_hook_wrapping_same_ring_during_construction() {
        let ring_ptr = ForeignPtr::new(0x10);
        let inner = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&inner);
        let (heap, bridge) = setup_with_hook(move |heap, bridge| {
            *slot.lock() = Some(bridge.wrap_ring(heap, Kind::Ring, ring_ptr));
        });
        bridge.library().script(&[1_500_000]);

        let outer = bridge.wrap_ring(&*heap, Kind::Ring, ring_ptr);

        let inner = inner.lock().take().unwrap().unwrap();
        assert!(matches!(
            outer,
            Err(FhbError::DuplicateWrap { existing, .. }) if existing == inner
        ));
        assert_eq!(heap.len(), 1);
        assert_eq!(bridge.ring_owner(ring_ptr), Some(inner));
        assert_eq!(bridge.stats().summary().duplicate_wraps, 1);

        heap.collect(CollectionMode::Full);
        assert_eq!(bridge.library().ops(), vec!["kill_ring"]);
        assert_eq!(bridge.ring_owner(ring_ptr), None);
    }

    /// A wrap from inside a collection asks for another one the heap ignores.
    ///
    /// **Bug this finds:** counter and threshold advancing for a cycle that never ran.
    #[test]
    fn test_declined_collection_leaves_monitor_untouched() {
        let (heap, bridge) = setup_with_hook(|heap, bridge| {
            bridge.library().script(&[2_000_000]);
            bridge.wrap(heap, Kind::String, ForeignPtr::new(0x40)).unwrap();
        });

        assert!(heap.collect(CollectionMode::Full));

        assert_eq!(heap.len(), 1);
        assert_eq!(heap.collections(), 1);
        assert_eq!(
            bridge.pressure_state(),
            PressureState {
                threshold_bytes: 1_000_000,
                counter: 0,
            }
        );
        let summary = bridge.stats().summary();
        assert_eq!(summary.partial_collections, 0);
        assert_eq!(summary.full_collections, 0);
        assert_eq!(summary.wrapped, 1);
    }

    #[test]
    fn test_install_is_idempotent() {
        let (heap, bridge) = setup();
        bridge.install(&heap);

        bridge.wrap_ring(&heap, Kind::Ring, ForeignPtr::new(0x10)).unwrap();
        heap.collect(CollectionMode::Full);
        assert_eq!(bridge.library().ops(), vec!["kill_ring"]);
    }

    #[test]
    fn test_pressure_triggers_collection() {
        let (heap, bridge) = setup();
        bridge.library().script(&[1_500_000, 800_000]);

        let handle = bridge.wrap(&heap, Kind::BigInt, ForeignPtr::new(0x10)).unwrap();

        let state = bridge.pressure_state();
        assert_eq!(state.counter, 1);
        assert_eq!(state.threshold_bytes, 1_600_000);
        assert_eq!(heap.collections(), 1);
        assert!(heap.contains(handle));
    }

    #[test]
    fn test_ring_argument_survives_triggered_collection() {
        let (heap, bridge) = setup();
        let ring_ptr = ForeignPtr::new(0x10);
        let ring = bridge.wrap_ring(&heap, Kind::Ring, ring_ptr).unwrap();
        bridge.library().script(&[2_000_000, 0]);

        let poly = bridge
            .wrap_with_ring(&heap, Kind::Poly, ForeignPtr::new(0x20), ring)
            .unwrap();

        assert!(heap.contains(ring));
        assert!(bridge.library().calls().is_empty());
        assert_eq!(bridge.ring_of(&heap, poly).unwrap(), ring);
    }

    #[test]
    fn test_cache_zero_first_wins() {
        let (heap, bridge) = setup();
        let ring = bridge.wrap_ring(&heap, Kind::Ring.immutable(), ForeignPtr::new(0x10)).unwrap();
        heap.root(ring);
        let z1 = bridge.wrap_with_ring(&heap, Kind::Poly, ForeignPtr::new(0x20), ring).unwrap();
        let z2 = bridge.wrap_with_ring(&heap, Kind::Poly, ForeignPtr::new(0x21), ring).unwrap();

        assert_eq!(bridge.cache_zero(&heap, ring, z1).unwrap(), z1);
        assert_eq!(bridge.cache_zero(&heap, ring, z2).unwrap(), z1);
        assert!(!bridge.is_mutable(&heap, z1).unwrap());
        assert!(bridge.is_mutable(&heap, z2).unwrap());
    }

    #[test]
    fn test_cache_on_non_ring_rejected() {
        let (heap, bridge) = setup();
        let a = bridge.wrap(&heap, Kind::Int, ForeignPtr::new(1)).unwrap();
        let b = bridge.wrap(&heap, Kind::Int, ForeignPtr::new(2)).unwrap();
        assert!(matches!(
            bridge.cache_one(&heap, a, b),
            Err(FhbError::NotARing { .. })
        ));
    }

    #[test]
    fn test_one_of_delegates_to_ring() {
        let (heap, bridge) = setup();
        let ring = bridge.wrap_ring(&heap, Kind::QRing.immutable(), ForeignPtr::new(0x10)).unwrap();
        let poly = bridge
            .wrap_with_ring(&heap, Kind::Poly.immutable(), ForeignPtr::new(0x20), ring)
            .unwrap();

        let make = |target: HandleRef| {
            assert_eq!(target, ring);
            bridge.wrap_with_ring(&heap, Kind::Poly, ForeignPtr::new(0x30), target)
        };
        let one = bridge.one_of(&heap, poly, make).unwrap();

        let again = bridge
            .one_of(&heap, ring, |_| panic!("cached element expected"))
            .unwrap();
        assert_eq!(one, again);
        assert!(!bridge.is_mutable(&heap, one).unwrap());
    }

    #[test]
    fn test_zero_of_mutable_is_fresh() {
        let (heap, bridge) = setup();
        let ring = bridge.wrap_ring(&heap, Kind::Ring, ForeignPtr::new(0x10)).unwrap();
        let mut next = 0x100;
        let mut make = |r: HandleRef| {
            next += 1;
            bridge.wrap_with_ring(&heap, Kind::Poly, ForeignPtr::new(next), r)
        };

        let a = bridge.zero_of(&heap, ring, &mut make).unwrap();
        let b = bridge.zero_of(&heap, ring, &mut make).unwrap();
        assert_ne!(a, b);
        assert!(heap.resolve(ring).unwrap().zero().is_none());
    }

    #[test]
    fn test_attach_attributes_replaces() {
        let (heap, bridge) = setup();
        let ring = bridge.wrap_ring(&heap, Kind::Ring, ForeignPtr::new(0x10)).unwrap();
        let poly = bridge
            .wrap_with_ring(&heap, Kind::Poly, ForeignPtr::new(0x20), ring)
            .unwrap();

        bridge.attach_attributes(&heap, poly, ForeignPtr::new(0x30)).unwrap();
        bridge.attach_attributes(&heap, poly, ForeignPtr::new(0x31)).unwrap();

        let calls = bridge.library().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].ptr, ForeignPtr::new(0x30));
        assert_eq!(calls[0].ring, Some(ForeignPtr::new(0x10)));
    }

    #[test]
    fn test_ring_of_plain_kind() {
        let (heap, bridge) = setup();
        let s = bridge.wrap(&heap, Kind::String, ForeignPtr::new(0x10)).unwrap();
        assert!(matches!(
            bridge.ring_of(&heap, s),
            Err(FhbError::NoAssociatedRing { kind: Kind::String })
        ));
    }

    #[test]
    fn test_link_counted_as_leak() {
        let (heap, bridge) = setup();
        bridge.wrap(&heap, Kind::Link, ForeignPtr::new(0x10)).unwrap();
        heap.collect(CollectionMode::Full);

        let summary = bridge.stats().summary();
        assert_eq!(summary.leaked_links, 1);
        assert_eq!(summary.finalized, 1);
        assert!(bridge.library().calls().is_empty());
    }

    #[test]
    fn test_metrics_snapshot() {
        let (heap, bridge) = setup();
        bridge.wrap(&heap, Kind::String, ForeignPtr::new(0x10)).unwrap();

        let text = bridge.metrics().to_prometheus();
        assert!(text.contains("fhb_handles_wrapped_total 1"));
        assert!(text.contains("fhb_pressure_threshold_bytes 1000000"));
    }
}
