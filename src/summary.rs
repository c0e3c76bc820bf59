//! End-of-run text summary.

use std::fmt::Write;

use crate::checks::CheckTally;
use crate::executor::ExecutionReport;
use crate::percentiles::format_percentile_table;
use crate::stats::RequestStats;
use crate::teardown::TeardownReport;
use crate::thresholds::ThresholdResult;

/// Everything the summary reports on.
pub struct RunSummary<'a> {
    pub checks: &'a CheckTally,
    pub requests: &'a RequestStats,
    pub execution: &'a ExecutionReport,
    pub teardown: &'a TeardownReport,
    pub thresholds: &'a [ThresholdResult],
}

impl RunSummary<'_> {
    fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|r| r.passed)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("\n=== CHECKS ===\n\n");
        let checks = self.checks.all();
        if checks.is_empty() {
            out.push_str("No checks evaluated.\n");
        }
        for (name, counts) in &checks {
            let mark = if counts.fails == 0 { "✓" } else { "✗" };
            let _ = writeln!(
                out,
                "  {} {:<40} {:>6.2}% ✓ {} ✗ {}",
                mark,
                name,
                counts.pass_rate() * 100.0,
                counts.passes,
                counts.fails
            );
        }

        out.push_str(&format_percentile_table(
            "Request Latency by Scenario",
            &self.requests.latencies_by_scenario().all_stats(),
        ));

        let counts = self.requests.counts(None);
        out.push_str("\n=== REQUESTS ===\n\n");
        let _ = writeln!(out, "  http_reqs:          {}", counts.total);
        let _ = writeln!(
            out,
            "  http_req_failed:    {:.2}% ({} of {})",
            counts.failed_rate() * 100.0,
            counts.failed,
            counts.total
        );
        if let Some(stats) = self.requests.latencies(None).and_then(|t| t.stats()) {
            let _ = writeln!(out, "  http_req_duration:  {}", stats.format());
        }

        out.push_str("\n=== ITERATIONS ===\n\n");
        let e = self.execution;
        let _ = writeln!(out, "  started:            {}", e.started);
        let _ = writeln!(out, "  completed:          {}", e.completed);
        let _ = writeln!(out, "  dropped:            {}", e.dropped);
        if e.interrupted > 0 {
            let _ = writeln!(out, "  interrupted:        {}", e.interrupted);
        }
        if e.panicked > 0 {
            let _ = writeln!(out, "  panicked:           {}", e.panicked);
        }
        let _ = writeln!(out, "  max VUs used:       {}", e.max_vus_used);
        let _ = writeln!(out, "  elapsed:            {:.2}s", e.elapsed.as_secs_f64());

        let _ = writeln!(
            out,
            "\n=== CAMPAIGN ===\n\n  issued:             {}",
            self.teardown.describe()
        );

        out.push_str("\n=== THRESHOLDS ===\n\n");
        if self.thresholds.is_empty() {
            out.push_str("No thresholds configured.\n");
        }
        for result in self.thresholds {
            let mark = if result.passed { "✓" } else { "✗" };
            let observed = result
                .observed
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "no data".to_string());
            let _ = writeln!(
                out,
                "  {} {:<55} observed: {}",
                mark, result.threshold.source, observed
            );
        }
        if !self.thresholds_passed() {
            out.push_str("\nSome thresholds have failed.\n");
        }

        out
    }
}
