//! Named response checks.
//!
//! A check is a named predicate over an [`RpcResponse`]. Evaluating checks
//! never aborts anything: every result is counted (pass or fail) in a
//! [`CheckTally`] and in the `checks_total` Prometheus counter, and the run
//! carries on. Thresholds later turn the tallies into a verdict.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::api::RpcResponse;
use crate::metrics::CHECKS_TOTAL;

type Predicate = Box<dyn Fn(&RpcResponse) -> bool + Send + Sync>;

/// A named boolean assertion over a response.
pub struct Check {
    name: String,
    predicate: Predicate,
}

impl Check {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RpcResponse) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, response: &RpcResponse) -> bool {
        (self.predicate)(response)
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

/// Standard checks for a response: exact status match and a JSON body.
pub fn check_response(expected_status: u16) -> Vec<Check> {
    vec![
        Check::new(format!("Status is {}", expected_status), move |r| {
            r.status == expected_status
        }),
        Check::new("Response is valid JSON", |r| {
            serde_json::from_str::<serde_json::Value>(&r.body).is_ok()
        }),
    ]
}

/// Pass/fail counts for one check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckCounts {
    pub passes: u64,
    pub fails: u64,
}

impl CheckCounts {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Fraction of passes; 1.0 when nothing was evaluated.
    pub fn pass_rate(&self) -> f64 {
        if self.total() == 0 {
            1.0
        } else {
            self.passes as f64 / self.total() as f64
        }
    }
}

/// Shared pass/fail counts keyed by check name.
#[derive(Clone, Default)]
pub struct CheckTally {
    counts: Arc<Mutex<BTreeMap<String, CheckCounts>>>,
}

impl CheckTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str, passed: bool) {
        CHECKS_TOTAL
            .with_label_values(&[name, if passed { "passed" } else { "failed" }])
            .inc();

        let mut counts = self.counts.lock().unwrap();
        let entry = counts.entry(name.to_string()).or_default();
        if passed {
            entry.passes += 1;
        } else {
            entry.fails += 1;
        }
    }

    pub fn counts(&self, name: &str) -> CheckCounts {
        self.counts
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or_default()
    }

    /// Counts per check, sorted by name.
    pub fn all(&self) -> Vec<(String, CheckCounts)> {
        self.counts
            .lock()
            .unwrap()
            .iter()
            .map(|(name, counts)| (name.clone(), *counts))
            .collect()
    }

    /// Counts summed across all checks.
    pub fn totals(&self) -> CheckCounts {
        self.counts
            .lock()
            .unwrap()
            .values()
            .fold(CheckCounts::default(), |acc, c| CheckCounts {
                passes: acc.passes + c.passes,
                fails: acc.fails + c.fails,
            })
    }
}

/// Evaluates every check against `response` and records the results.
/// Returns true when all of them passed.
pub fn check(response: &RpcResponse, checks: &[Check], tally: &CheckTally) -> bool {
    let mut all_passed = true;
    for c in checks {
        let passed = c.evaluate(response);
        if !passed {
            debug!(
                check = c.name(),
                status_code = response.status,
                duration_ms = response.duration.as_millis() as u64,
                "Check failed"
            );
        }
        tally.record(c.name(), passed);
        all_passed &= passed;
    }
    all_passed
}

/// Records every check as failed, for calls that produced no response.
pub fn fail_all(checks: &[Check], tally: &CheckTally) {
    for c in checks {
        tally.record(c.name(), false);
    }
}
