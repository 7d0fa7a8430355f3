// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured telemetry and metrics collection for Scout job runs.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

use scout_config::LogFormat;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

static INIT: OnceLock<()> = OnceLock::new();

/// Install a `tracing-subscriber` global default, selecting `pretty` or
/// `json` output based on `format`. Idempotent: later calls are no-ops so
/// library consumers and tests can call it freely.
pub fn init(format: LogFormat) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
        match format {
            LogFormat::Pretty => {
                let _ = subscriber.pretty().try_init();
            }
            LogFormat::Json => {
                let _ = subscriber.json().try_init();
            }
        }
    });
}

// ---------------------------------------------------------------------------
// JobMetrics
// ---------------------------------------------------------------------------

/// Metrics captured for a single job run, from `plan` through `finalize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobMetrics {
    /// The job's requested mode (`"fast"`, `"balanced"`, `"deep"`).
    pub mode: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Slices executed.
    pub slices_run: u64,
    /// Adapter calls made.
    pub adapter_calls: u64,
    /// Source documents persisted.
    pub source_docs: u64,
    /// Claims inserted.
    pub claims_inserted: u64,
    /// Reflection repair loops executed.
    pub reflection_loops: u64,
    /// Non-fatal errors recorded during the run.
    pub errors_count: u64,
    /// Final job status (`"done"` or `"failed"`).
    pub final_status: String,
}

/// Aggregated statistics across multiple job runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    /// Number of runs recorded.
    pub count: usize,
    /// Mean duration in milliseconds.
    pub mean_duration_ms: f64,
    /// Median (p50) duration in milliseconds.
    pub p50_duration_ms: f64,
    /// 99th-percentile duration in milliseconds.
    pub p99_duration_ms: f64,
    /// Total adapter calls across all runs.
    pub total_adapter_calls: u64,
    /// Error rate (errors / total runs).
    pub error_rate: f64,
    /// Per-mode run counts (deterministic ordering).
    pub mode_counts: BTreeMap<String, usize>,
}

impl Default for MetricsSummary {
    fn default() -> Self {
        Self {
            count: 0,
            mean_duration_ms: 0.0,
            p50_duration_ms: 0.0,
            p99_duration_ms: 0.0,
            total_adapter_calls: 0,
            error_rate: 0.0,
            mode_counts: BTreeMap::new(),
        }
    }
}

fn percentile(sorted: &[u64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0) * (sorted.len() as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo] as f64
    } else {
        let frac = rank - lo as f64;
        sorted[lo] as f64 * (1.0 - frac) + sorted[hi] as f64 * frac
    }
}

/// Thread-safe collector for job run metrics.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Vec<JobMetrics>>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new, empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record a completed run's metrics.
    pub fn record(&self, metrics: JobMetrics) {
        let mut data = self.inner.lock().expect("metrics lock poisoned");
        data.push(metrics);
    }

    /// Return all recorded run metrics.
    #[must_use]
    pub fn runs(&self) -> Vec<JobMetrics> {
        let data = self.inner.lock().expect("metrics lock poisoned");
        data.clone()
    }

    /// Number of runs recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        let data = self.inner.lock().expect("metrics lock poisoned");
        data.len()
    }

    /// Whether the collector has no recorded runs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compute an aggregated summary of all recorded runs.
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let data = self.inner.lock().expect("metrics lock poisoned");
        if data.is_empty() {
            return MetricsSummary::default();
        }

        let count = data.len();
        let mut durations: Vec<u64> = data.iter().map(|r| r.duration_ms).collect();
        durations.sort_unstable();

        let total_duration: u64 = durations.iter().sum();
        let mean_duration_ms = total_duration as f64 / count as f64;
        let p50_duration_ms = percentile(&durations, 50.0);
        let p99_duration_ms = percentile(&durations, 99.0);

        let total_adapter_calls: u64 = data.iter().map(|r| r.adapter_calls).sum();
        let errors: u64 = data.iter().map(|r| r.errors_count).sum();
        let error_rate = errors as f64 / count as f64;

        let mut mode_counts: BTreeMap<String, usize> = BTreeMap::new();
        for r in data.iter() {
            *mode_counts.entry(r.mode.clone()).or_insert(0) += 1;
        }

        MetricsSummary {
            count,
            mean_duration_ms,
            p50_duration_ms,
            p99_duration_ms,
            total_adapter_calls,
            error_rate,
            mode_counts,
        }
    }

    /// Clear all recorded metrics.
    pub fn clear(&self) {
        let mut data = self.inner.lock().expect("metrics lock poisoned");
        data.clear();
    }
}

// ---------------------------------------------------------------------------
// Spans
// ---------------------------------------------------------------------------

/// A structured span emitted under a `scout.<component>` target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySpan {
    /// Fully-qualified target, e.g. `"scout.orchestrator"`.
    pub target: String,
    /// Span name / operation, e.g. `"stage_transition"`.
    pub name: String,
    /// Arbitrary key-value attributes (deterministic ordering).
    pub attributes: BTreeMap<String, String>,
}

impl TelemetrySpan {
    /// Create a new span under `target` (e.g. `"scout.frontier"`).
    #[must_use]
    pub fn new(target: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Insert an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Emit the span via `tracing::info!`.
    pub fn emit(&self) {
        info!(
            target: "scout.telemetry",
            span_target = %self.target,
            span_name = %self.name,
            attributes = ?self.attributes,
            "telemetry_span"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(mode: &str, duration: u64, errors: u64) -> JobMetrics {
        JobMetrics {
            mode: mode.to_string(),
            duration_ms: duration,
            errors_count: errors,
            ..Default::default()
        }
    }

    #[test]
    fn summary_of_empty_collector_is_zeroed() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.summary(), MetricsSummary::default());
    }

    #[test]
    fn summary_computes_mean_and_error_rate() {
        let collector = MetricsCollector::new();
        collector.record(sample("balanced", 100, 0));
        collector.record(sample("balanced", 300, 1));
        let summary = collector.summary();
        assert_eq!(summary.count, 2);
        assert!((summary.mean_duration_ms - 200.0).abs() < 1e-9);
        assert!((summary.error_rate - 0.5).abs() < 1e-9);
        assert_eq!(summary.mode_counts.get("balanced"), Some(&2));
    }

    #[test]
    fn init_is_idempotent() {
        init(LogFormat::Pretty);
        init(LogFormat::Pretty);
    }
}
