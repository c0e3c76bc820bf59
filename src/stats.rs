//! In-process request aggregates.
//!
//! Prometheus counters are write-mostly and global; thresholds and the final
//! summary need readable totals scoped to one run, so every RPC call is also
//! recorded here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::percentiles::{MultiLabelPercentileTracker, PercentileTracker};

/// Request and failure counts for one scenario label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCounts {
    pub total: u64,
    pub failed: u64,
}

impl RequestCounts {
    /// Fraction of failed requests, 0.0 when nothing was sent.
    pub fn failed_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

/// Aggregates for every RPC call made during a run.
#[derive(Clone)]
pub struct RequestStats {
    start_time: Instant,
    latencies: PercentileTracker,
    latencies_by_scenario: MultiLabelPercentileTracker,
    counts: Arc<Mutex<HashMap<String, RequestCounts>>>,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            latencies: PercentileTracker::new(),
            latencies_by_scenario: MultiLabelPercentileTracker::new(),
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record one call made under `scenario`.
    pub fn record(&self, scenario: &str, duration: Duration, failed: bool) {
        self.latencies.record(duration);
        self.latencies_by_scenario.record(scenario, duration);

        let mut counts = self.counts.lock().unwrap();
        let entry = counts.entry(scenario.to_string()).or_default();
        entry.total += 1;
        if failed {
            entry.failed += 1;
        }
    }

    /// Latency tracker for all calls, or for one scenario.
    pub fn latencies(&self, scenario: Option<&str>) -> Option<PercentileTracker> {
        match scenario {
            None => Some(self.latencies.clone()),
            Some(label) => self.latencies_by_scenario.tracker(label),
        }
    }

    pub fn latencies_by_scenario(&self) -> &MultiLabelPercentileTracker {
        &self.latencies_by_scenario
    }

    /// Counts for all calls, or for one scenario.
    pub fn counts(&self, scenario: Option<&str>) -> RequestCounts {
        let counts = self.counts.lock().unwrap();
        match scenario {
            Some(label) => counts.get(label).copied().unwrap_or_default(),
            None => counts.values().fold(RequestCounts::default(), |acc, c| {
                RequestCounts {
                    total: acc.total + c.total,
                    failed: acc.failed + c.failed,
                }
            }),
        }
    }

    /// Average request rate since this tracker was created.
    pub fn requests_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.counts(None).total as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}
