//! Percentile latency tracking using HDR Histogram.
//!
//! Latencies are stored in microseconds and reported in milliseconds. One
//! tracker covers every RPC call; a labelled tracker splits the same samples
//! by scenario (`setup`, `issue_coupons`, `teardown`) so thresholds can target
//! a single scenario.

use hdrhistogram::Histogram;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Upper bound of the tracked range: 60 seconds in microseconds.
const MAX_TRACKED_US: u64 = 60_000_000;

/// Percentile statistics for a set of latency measurements.
#[derive(Debug, Clone)]
pub struct PercentileStats {
    /// Number of samples
    pub count: u64,

    /// Minimum value (microseconds)
    pub min: u64,

    /// Maximum value (microseconds)
    pub max: u64,

    /// Mean value (microseconds)
    pub mean: f64,

    /// 50th percentile - median (microseconds)
    pub p50: u64,

    /// 90th percentile (microseconds)
    pub p90: u64,

    /// 95th percentile (microseconds)
    pub p95: u64,

    /// 99th percentile (microseconds)
    pub p99: u64,

    /// 99.9th percentile (microseconds)
    pub p99_9: u64,
}

impl PercentileStats {
    /// Format statistics as a human-readable string.
    pub fn format(&self) -> String {
        format!(
            "count={}, min={:.2}ms, max={:.2}ms, mean={:.2}ms, p50={:.2}ms, p90={:.2}ms, p95={:.2}ms, p99={:.2}ms",
            self.count,
            self.min as f64 / 1000.0,
            self.max as f64 / 1000.0,
            self.mean / 1000.0,
            self.p50 as f64 / 1000.0,
            self.p90 as f64 / 1000.0,
            self.p95 as f64 / 1000.0,
            self.p99 as f64 / 1000.0,
        )
    }

    /// Format statistics as a compact table row.
    pub fn format_table_row(&self, label: &str) -> String {
        format!(
            "{:<20} {:>8} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>8.2}",
            label,
            self.count,
            self.p50 as f64 / 1000.0,
            self.p90 as f64 / 1000.0,
            self.p95 as f64 / 1000.0,
            self.p99 as f64 / 1000.0,
            self.p99_9 as f64 / 1000.0,
            self.mean / 1000.0,
            self.max as f64 / 1000.0,
        )
    }
}

/// Thread-safe percentile tracker.
#[derive(Clone)]
pub struct PercentileTracker {
    /// Tracks 1μs to 60s with 3 significant digits
    histogram: Arc<Mutex<Histogram<u64>>>,
}

impl PercentileTracker {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_TRACKED_US, 3)
            .expect("static histogram bounds are valid");

        Self {
            histogram: Arc::new(Mutex::new(histogram)),
        }
    }

    /// Record a latency.
    pub fn record(&self, latency: Duration) {
        let latency_us = u64::try_from(latency.as_micros()).unwrap_or(MAX_TRACKED_US);
        self.record_us(latency_us);
    }

    /// Record a latency measurement in microseconds, clamped to 1μs..60s.
    pub fn record_us(&self, latency_us: u64) {
        let mut hist = self.histogram.lock().unwrap();

        let clamped = latency_us.clamp(1, MAX_TRACKED_US);

        if let Err(e) = hist.record(clamped) {
            warn!(
                latency_us = latency_us,
                error = %e,
                "Failed to record latency in histogram"
            );
        }
    }

    /// Value at `quantile` (0.0..=1.0) in microseconds, or None when empty.
    pub fn value_at_quantile(&self, quantile: f64) -> Option<u64> {
        let hist = self.histogram.lock().unwrap();
        if hist.is_empty() {
            None
        } else {
            Some(hist.value_at_quantile(quantile.clamp(0.0, 1.0)))
        }
    }

    /// Current percentile statistics; None if no samples have been recorded.
    pub fn stats(&self) -> Option<PercentileStats> {
        let hist = self.histogram.lock().unwrap();

        if hist.is_empty() {
            return None;
        }

        Some(PercentileStats {
            count: hist.len(),
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_quantile(0.50),
            p90: hist.value_at_quantile(0.90),
            p95: hist.value_at_quantile(0.95),
            p99: hist.value_at_quantile(0.99),
            p99_9: hist.value_at_quantile(0.999),
        })
    }
}

impl Default for PercentileTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile trackers keyed by label.
///
/// The label set is small and fixed (one per scenario), so no eviction is done.
#[derive(Clone, Default)]
pub struct MultiLabelPercentileTracker {
    trackers: Arc<Mutex<HashMap<String, PercentileTracker>>>,
}

impl MultiLabelPercentileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a latency for `label`, creating its tracker on first use.
    pub fn record(&self, label: &str, latency: Duration) {
        let tracker = {
            let mut trackers = self.trackers.lock().unwrap();
            trackers
                .entry(label.to_string())
                .or_insert_with(PercentileTracker::new)
                .clone()
        };
        tracker.record(latency);
    }

    /// Tracker for `label`, if anything was recorded under it.
    pub fn tracker(&self, label: &str) -> Option<PercentileTracker> {
        self.trackers.lock().unwrap().get(label).cloned()
    }

    /// Statistics for all labels that have samples.
    pub fn all_stats(&self) -> HashMap<String, PercentileStats> {
        let trackers = self.trackers.lock().unwrap();
        trackers
            .iter()
            .filter_map(|(label, tracker)| tracker.stats().map(|s| (label.clone(), s)))
            .collect()
    }
}

/// Format percentile statistics as a table sorted by label.
pub fn format_percentile_table(
    title: &str,
    stats_map: &HashMap<String, PercentileStats>,
) -> String {
    if stats_map.is_empty() {
        return format!("## {}\n\nNo data available.\n", title);
    }

    let mut output = String::new();
    output.push_str(&format!("\n## {}\n\n", title));
    output.push_str(&format!(
        "{:<20} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
        "Label", "Count", "P50", "P90", "P95", "P99", "P99.9", "Mean", "Max"
    ));
    output.push_str(&format!(
        "{:<20} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
        "", "", "(ms)", "(ms)", "(ms)", "(ms)", "(ms)", "(ms)", "(ms)"
    ));
    output.push_str(&"-".repeat(100));
    output.push('\n');

    let mut labels: Vec<_> = stats_map.keys().collect();
    labels.sort();

    for label in labels {
        output.push_str(&stats_map[label].format_table_row(label));
        output.push('\n');
    }

    output
}
