//! Bridge Logging and Tracing
//!
//! Structured events for the lifecycle bridge, useful for:
//! - Tuning the pressure monitor
//! - Tracking down leaks and double frees
//! - Production monitoring
//!
//! Log Levels:
//! - ERROR: Rejected constructions
//! - WARN: Known leaks
//! - INFO: Triggered collections, queue drains
//! - DEBUG: Deferrals, threshold changes
//! - TRACE: Per-handle finalization

use crate::handle::{ForeignPtr, HandleRef};
use crate::host::CollectionMode;
use crate::kind::Kind;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Log level for bridge operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// Bridge event types
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Pressure monitor fired a collection
    CollectionTriggered {
        mode: CollectionMode,
        bytes_before: usize,
        bytes_after: usize,
        counter: u32,
        duration_ms: f64,
    },

    /// Threshold retuned after a collection
    ThresholdTuned { old_bytes: usize, new_bytes: usize },

    /// Ring parked on the deferred queue
    RingDeferred { ring: ForeignPtr, queued: usize },

    /// Deferred queue drained by the post-collection hook
    DeferredDrained { destroyed: usize, duration_us: u64 },

    /// Second wrap of an already-owned ring rejected
    DuplicateWrap { ring: ForeignPtr, existing: HandleRef },

    /// Link finalized without teardown
    LinkLeaked { link: ForeignPtr },

    /// Handle finalized
    Finalized { kind: Kind, foreign: ForeignPtr },
}

impl BridgeEvent {
    /// Log level of this event
    pub fn level(&self) -> LogLevel {
        match self {
            BridgeEvent::DuplicateWrap { .. } => LogLevel::Error,
            BridgeEvent::LinkLeaked { .. } => LogLevel::Warn,
            BridgeEvent::CollectionTriggered { .. } | BridgeEvent::DeferredDrained { .. } => {
                LogLevel::Info
            },
            BridgeEvent::ThresholdTuned { .. } | BridgeEvent::RingDeferred { .. } => {
                LogLevel::Debug
            },
            BridgeEvent::Finalized { .. } => LogLevel::Trace,
        }
    }

    /// Render as a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BridgeEvent::CollectionTriggered {
                mode,
                bytes_before,
                bytes_after,
                counter,
                duration_ms,
            } => serde_json::json!({
                "type": "collection_triggered",
                "mode": mode,
                "bytes_before": bytes_before,
                "bytes_after": bytes_after,
                "counter": counter,
                "duration_ms": duration_ms
            }),
            BridgeEvent::ThresholdTuned {
                old_bytes,
                new_bytes,
            } => serde_json::json!({
                "type": "threshold_tuned",
                "old_bytes": old_bytes,
                "new_bytes": new_bytes
            }),
            BridgeEvent::RingDeferred { ring, queued } => serde_json::json!({
                "type": "ring_deferred",
                "ring": ring.to_string(),
                "queued": queued
            }),
            BridgeEvent::DeferredDrained {
                destroyed,
                duration_us,
            } => serde_json::json!({
                "type": "deferred_drained",
                "destroyed": destroyed,
                "duration_us": duration_us
            }),
            BridgeEvent::DuplicateWrap { ring, existing } => serde_json::json!({
                "type": "duplicate_wrap",
                "ring": ring.to_string(),
                "existing": existing.into_raw()
            }),
            BridgeEvent::LinkLeaked { link } => serde_json::json!({
                "type": "link_leaked",
                "link": link.to_string()
            }),
            BridgeEvent::Finalized { kind, foreign } => serde_json::json!({
                "type": "finalized",
                "kind": kind.name(),
                "foreign": foreign.to_string()
            }),
        }
    }
}

/// Bridge logger configuration
#[derive(Debug, Clone)]
pub struct BridgeLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Enable console output
    pub console: bool,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,
}

impl Default for BridgeLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: true,
            json: false,
            timestamps: true,
        }
    }
}

/// Events kept by a [`BridgeLogger`]; older ones are dropped first
pub const MAX_EVENTS: usize = 4096;

/// Bridge Logger - centralized event log
pub struct BridgeLogger {
    config: BridgeLoggerConfig,
    events: Mutex<VecDeque<(Instant, BridgeEvent)>>,
    enabled: AtomicBool,
}

impl BridgeLogger {
    pub fn new(config: BridgeLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Log a bridge event
    pub fn log(&self, event: BridgeEvent) {
        if !self.is_enabled() || event.level() > self.config.level {
            return;
        }

        if self.config.console {
            self.output_console(&event);
        }

        if let Ok(mut events) = self.events.lock() {
            if events.len() == MAX_EVENTS {
                events.pop_front();
            }
            events.push_back((Instant::now(), event));
        }
    }

    fn output_console(&self, event: &BridgeEvent) {
        if self.config.timestamps {
            let now = chrono::Local::now();
            print!("[{}] ", now.format("%Y-%m-%d %H:%M:%S%.3f"));
        }

        if self.config.json {
            if let Ok(json_str) = serde_json::to_string(&event.to_json()) {
                println!("{}", json_str);
            }
        } else {
            self.output_human(event);
        }
    }

    fn output_human(&self, event: &BridgeEvent) {
        match event {
            BridgeEvent::CollectionTriggered {
                mode,
                bytes_before,
                bytes_after,
                counter,
                duration_ms,
            } => {
                println!(
                    "[FHB] {} collection ({} -> {} foreign bytes, counter {}, {:.2}ms)",
                    mode, bytes_before, bytes_after, counter, duration_ms
                );
            },
            BridgeEvent::ThresholdTuned {
                old_bytes,
                new_bytes,
            } => {
                println!("[FHB] Threshold {} -> {} bytes", old_bytes, new_bytes);
            },
            BridgeEvent::RingDeferred { ring, queued } => {
                println!("[FHB] Ring {} deferred ({} queued)", ring, queued);
            },
            BridgeEvent::DeferredDrained {
                destroyed,
                duration_us,
            } => {
                println!("[FHB] Drained {} rings ({} us)", destroyed, duration_us);
            },
            BridgeEvent::DuplicateWrap { ring, existing } => {
                eprintln!("[FHB] Ring {} already wrapped by {}", ring, existing);
            },
            BridgeEvent::LinkLeaked { link } => {
                eprintln!("[FHB] Link {} finalized without teardown", link);
            },
            BridgeEvent::Finalized { kind, foreign } => {
                println!("[FHB] Finalized {} {}", kind, foreign);
            },
        }
    }

    /// Get retained events, oldest first
    pub fn get_events(&self) -> Vec<(Instant, BridgeEvent)> {
        if let Ok(events) = self.events.lock() {
            events.iter().cloned().collect()
        } else {
            Vec::new()
        }
    }

    /// Clear all events
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        if let Ok(events) = self.events.lock() {
            events.len()
        } else {
            0
        }
    }
}

impl Default for BridgeLogger {
    fn default() -> Self {
        Self::new(BridgeLoggerConfig::default())
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<BridgeLogger> = Mutex::new(BridgeLogger::default());
}

/// Log a bridge event to the global logger
pub fn log_event(event: BridgeEvent) {
    if let Ok(logger) = GLOBAL_LOGGER.lock() {
        logger.log(event);
    }
}

/// Configure global logger
pub fn configure_logger(config: BridgeLoggerConfig) {
    if let Ok(mut logger) = GLOBAL_LOGGER.lock() {
        *logger = BridgeLogger::new(config);
    }
}

/// Get global logger event count
pub fn get_event_count() -> usize {
    if let Ok(logger) = GLOBAL_LOGGER.lock() {
        logger.event_count()
    } else {
        0
    }
}
