//! Bridge Runtime - C ABI for FHB
//!
//! Provides C-compatible functions for wrapping foreign objects and for the
//! collector callbacks. One bridge instance exists per process.

use crate::vtable::{CHost, CLibrary, FhbForeignVTable, FhbHostVTable};
use anyhow::Context;
use fhb::logging::{self, BridgeLoggerConfig, LogLevel};
use fhb::{Bridge, BridgeConfig, FhbError, HandleRef, Tag, TaggedHandle};
use libc::{c_void, size_t};
use std::sync::{Arc, OnceLock};

struct Runtime {
    host: CHost,
    bridge: Arc<Bridge<CLibrary>>,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Result code of the `fhb_*` functions
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FhbStatus {
    Ok = 0,
    NotInitialized = 1,
    NullArgument = 2,
    UnknownKind = 3,
    DuplicateWrap = 4,
    RingDependencyMismatch = 5,
    NotARing = 6,
    NoAssociatedRing = 7,
    DanglingHandle = 8,
    Internal = 9,
}

impl From<&FhbError> for FhbStatus {
    fn from(err: &FhbError) -> Self {
        match err {
            FhbError::DuplicateWrap { .. } => FhbStatus::DuplicateWrap,
            FhbError::UnknownKind(_) => FhbStatus::UnknownKind,
            FhbError::RingDependencyMismatch { .. } => FhbStatus::RingDependencyMismatch,
            FhbError::NotARing { .. } => FhbStatus::NotARing,
            FhbError::NoAssociatedRing { .. } => FhbStatus::NoAssociatedRing,
            FhbError::DanglingHandle(_) => FhbStatus::DanglingHandle,
            FhbError::Configuration(_) | FhbError::Internal(_) => FhbStatus::Internal,
        }
    }
}

fn build_runtime(host: FhbHostVTable, foreign: FhbForeignVTable) -> anyhow::Result<Runtime> {
    let config = BridgeConfig::from_env();
    if config.verbose {
        logging::configure_logger(BridgeLoggerConfig {
            level: LogLevel::Debug,
            ..Default::default()
        });
    }
    let bridge = Bridge::new(CLibrary::new(foreign), config)
        .context("invalid bridge configuration from FHB_* environment")?;
    let runtime = Runtime {
        host: CHost::new(host),
        bridge: Arc::new(bridge),
    };
    runtime.bridge.install(&runtime.host);
    Ok(runtime)
}

fn report(op: &str, err: &FhbError) -> FhbStatus {
    if err.is_fatal() {
        log::error!("{}: {}", op, err);
        eprintln!("FHB fatal error in {}: {}", op, err);
    } else {
        log::warn!("{}: {}", op, err);
    }
    FhbStatus::from(err)
}

fn with_runtime(f: impl FnOnce(&Runtime) -> FhbStatus) -> FhbStatus {
    match RUNTIME.get() {
        Some(runtime) => f(runtime),
        None => FhbStatus::NotInitialized,
    }
}

fn store(out: *mut u64, handle: HandleRef) -> FhbStatus {
    // SAFETY: callers checked `out` for null; it points to caller-owned storage.
    unsafe { *out = handle.into_raw() };
    FhbStatus::Ok
}

/// Initialise the process-wide bridge
///
/// Returns `true` if the bridge is ready. Later calls are no-ops.
///
/// # Safety
/// Both tables must be valid for reads; their function pointers must stay
/// valid for the life of the process.
#[no_mangle]
pub unsafe extern "C" fn fhb_runtime_init(
    host: *const FhbHostVTable,
    foreign: *const FhbForeignVTable,
) -> bool {
    if RUNTIME.get().is_some() {
        return true;
    }
    if host.is_null() || foreign.is_null() {
        eprintln!("Failed to create bridge runtime: null function table");
        return false;
    }

    match build_runtime(*host, *foreign) {
        Ok(runtime) => {
            // A racing initialiser may have won; either runtime is usable.
            let _ = RUNTIME.set(runtime);
            true
        },
        Err(e) => {
            eprintln!("Failed to create bridge runtime: {:#}", e);
            false
        },
    }
}

/// Wrap a foreign object of a ring-free kind
#[no_mangle]
pub extern "C" fn fhb_wrap(tag: u32, foreign: *mut c_void, out: *mut u64) -> FhbStatus {
    if out.is_null() {
        return FhbStatus::NullArgument;
    }
    with_runtime(|rt| {
        let result = Tag::from_raw(tag)
            .and_then(|tag| rt.bridge.wrap(&rt.host, tag, fhb::ForeignPtr::new(foreign as usize)));
        match result {
            Ok(handle) => store(out, handle),
            Err(err) => report("fhb_wrap", &err),
        }
    })
}

/// Wrap a foreign object owned by the ring bag `ring`
#[no_mangle]
pub extern "C" fn fhb_wrap_with_ring(
    tag: u32,
    foreign: *mut c_void,
    ring: u64,
    out: *mut u64,
) -> FhbStatus {
    if out.is_null() {
        return FhbStatus::NullArgument;
    }
    with_runtime(|rt| {
        let result = Tag::from_raw(tag).and_then(|tag| {
            rt.bridge.wrap_with_ring(
                &rt.host,
                tag,
                fhb::ForeignPtr::new(foreign as usize),
                HandleRef::from_raw(ring),
            )
        });
        match result {
            Ok(handle) => store(out, handle),
            Err(err) => report("fhb_wrap_with_ring", &err),
        }
    })
}

/// Wrap a foreign ring or q-ring
#[no_mangle]
pub extern "C" fn fhb_wrap_ring(tag: u32, ring: *mut c_void, out: *mut u64) -> FhbStatus {
    if out.is_null() {
        return FhbStatus::NullArgument;
    }
    with_runtime(|rt| {
        let result = Tag::from_raw(tag)
            .and_then(|tag| rt.bridge.wrap_ring(&rt.host, tag, fhb::ForeignPtr::new(ring as usize)));
        match result {
            Ok(handle) => store(out, handle),
            Err(err) => report("fhb_wrap_ring", &err),
        }
    })
}

/// Finalize the payload of a dead bag
///
/// # Safety
/// `payload` must be a bag payload produced by this runtime, passed at most
/// once, after the host has proven the bag unreachable.
#[no_mangle]
pub unsafe extern "C" fn fhb_finalize(payload: *const c_void) {
    if payload.is_null() {
        return;
    }
    let handle = Arc::from_raw(payload as *const TaggedHandle);
    match RUNTIME.get() {
        Some(rt) => {
            if let Err(err) = rt.bridge.finalize(&handle) {
                report("fhb_finalize", &err);
            }
        },
        None => eprintln!("fhb_finalize called before fhb_runtime_init"),
    }
}

/// Write the bag references held by `payload` into `out`
///
/// Returns the number of references; at most `cap` are written.
///
/// # Safety
/// `payload` must be a live bag payload; `out` must have room for `cap` values.
#[no_mangle]
pub unsafe extern "C" fn fhb_mark(payload: *const c_void, out: *mut u64, cap: size_t) -> size_t {
    if payload.is_null() {
        return 0;
    }
    let handle = &*(payload as *const TaggedHandle);

    let mut count = 0;
    for reference in handle.references() {
        if count < cap && !out.is_null() {
            *out.add(count) = reference.into_raw();
        }
        count += 1;
    }
    count
}

/// Post-collection hook: drain deferred rings, then the host's previous hook
#[no_mangle]
pub extern "C" fn fhb_after_collection() {
    if let Some(rt) = RUNTIME.get() {
        rt.bridge.after_collection();
    }
}

/// Mark the handle in bag `handle` immutable
#[no_mangle]
pub extern "C" fn fhb_make_immutable(handle: u64) -> FhbStatus {
    with_runtime(|rt| match rt.bridge.make_immutable(&rt.host, HandleRef::from_raw(handle)) {
        Ok(_) => FhbStatus::Ok,
        Err(err) => report("fhb_make_immutable", &err),
    })
}

/// Current foreign resident byte count
#[no_mangle]
pub extern "C" fn fhb_foreign_bytes() -> size_t {
    RUNTIME
        .get()
        .map_or(0, |rt| rt.bridge.foreign_bytes())
}

/// Destroy any still-queued rings and log the final counters
#[no_mangle]
pub extern "C" fn fhb_shutdown() {
    if let Some(rt) = RUNTIME.get() {
        let drained = rt.bridge.drain_deferred();
        let summary = rt.bridge.stats().summary();
        log::debug!(
            "bridge shutdown: {} rings drained, {} handles live, {} links leaked",
            drained,
            summary.live_handles,
            summary.leaked_links
        );
        log::trace!("bridge metrics: {}", rt.bridge.metrics().to_json());
    }
}
