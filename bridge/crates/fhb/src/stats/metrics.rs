//! Bridge Metrics - Export Metrics
//!
//! Exports bridge counters to monitoring systems
//! (Prometheus, Grafana, etc.)

use super::BridgeSummary;
use crate::pressure::PressureState;
use indexmap::IndexMap;
use parking_lot::Mutex;

/// BridgeMetrics - metrics exporter
pub struct BridgeMetrics {
    metrics: Mutex<IndexMap<String, MetricValue>>,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(IndexMap::new()),
        }
    }

    /// Build from a stats summary and the monitor state
    pub fn from_summary(summary: &BridgeSummary, pressure: PressureState) -> Self {
        let metrics = Self::new();
        let counters = [
            ("fhb_handles_wrapped_total", summary.wrapped),
            ("fhb_rings_wrapped_total", summary.wrapped_rings),
            ("fhb_handles_finalized_total", summary.finalized),
            ("fhb_rings_deferred_total", summary.rings_deferred),
            ("fhb_rings_destroyed_total", summary.rings_destroyed),
            ("fhb_partial_collections_total", summary.partial_collections),
            ("fhb_full_collections_total", summary.full_collections),
            ("fhb_deferred_drains_total", summary.drains),
            ("fhb_leaked_links_total", summary.leaked_links),
            ("fhb_duplicate_wraps_total", summary.duplicate_wraps),
        ];
        for (name, value) in counters {
            metrics.add(name.to_string(), MetricValue::Counter(value));
        }

        metrics.add(
            "fhb_live_handles".to_string(),
            MetricValue::Gauge(summary.live_handles as f64),
        );
        metrics.add(
            "fhb_pressure_threshold_bytes".to_string(),
            MetricValue::Gauge(pressure.threshold_bytes as f64),
        );
        metrics.add(
            "fhb_pressure_counter".to_string(),
            MetricValue::Gauge(f64::from(pressure.counter)),
        );
        metrics.add(
            "fhb_collection_time_ms".to_string(),
            MetricValue::Gauge(summary.collection_time_ms),
        );
        metrics
    }

    /// Add metric
    pub fn add(&self, name: String, value: MetricValue) {
        self.metrics.lock().insert(name, value);
    }

    /// Get metric
    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.metrics.lock().get(name).copied()
    }

    /// Export to Prometheus format
    pub fn to_prometheus(&self) -> String {
        let metrics = self.metrics.lock();
        let mut output = String::new();

        for (name, value) in metrics.iter() {
            output.push_str(&format!("{} {}\n", name, value.as_f64()));
        }

        output
    }

    /// Export to JSON
    pub fn to_json(&self) -> String {
        let metrics = self.metrics.lock();
        let map: serde_json::Map<String, serde_json::Value> = metrics
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::json!(value.as_f64())))
            .collect();

        serde_json::Value::Object(map).to_string()
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metric value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Counter(v) => *v as f64,
            MetricValue::Gauge(v) => *v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_export() {
        let summary = BridgeSummary {
            wrapped: 5,
            finalized: 3,
            live_handles: 2,
            ..Default::default()
        };
        let pressure = PressureState {
            threshold_bytes: 1_600_000,
            counter: 4,
        };

        let metrics = BridgeMetrics::from_summary(&summary, pressure);
        let text = metrics.to_prometheus();

        assert!(text.starts_with("fhb_handles_wrapped_total 5\n"));
        assert!(text.contains("fhb_pressure_threshold_bytes 1600000\n"));
        assert_eq!(metrics.get("fhb_live_handles"), Some(MetricValue::Gauge(2.0)));
    }

    #[test]
    fn test_json_export() {
        let metrics = BridgeMetrics::new();
        metrics.add("fhb_drains".to_string(), MetricValue::Counter(7));

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["fhb_drains"], 7.0);
    }
}
