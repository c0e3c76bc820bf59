//! Wires configuration, client and scenario into one run.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::CouponApi;
use crate::checks::CheckTally;
use crate::client::build_client;
use crate::config::Config;
use crate::executor::ExecutionReport;
use crate::lifecycle::{self, RunError};
use crate::scenario::{CouponScenario, ISSUE_SCENARIO};
use crate::stats::RequestStats;
use crate::summary::RunSummary;
use crate::teardown::TeardownReport;
use crate::thresholds::{evaluate_all, ThresholdInputs, ThresholdResult, THRESHOLDS_FAILED_EXIT_CODE};

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub execution: ExecutionReport,
    pub teardown: TeardownReport,
    pub thresholds: Vec<ThresholdResult>,
    pub summary: String,
}

impl RunOutcome {
    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|r| r.passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.thresholds_passed() {
            0
        } else {
            THRESHOLDS_FAILED_EXIT_CODE
        }
    }
}

/// Runs the coupon scenario described by `config` and evaluates its thresholds.
pub async fn run_load_test(config: &Config) -> Result<RunOutcome, RunError> {
    let client_result = build_client(&config.to_client_config())?;
    config.print_summary(&client_result.default_headers);

    let requests = RequestStats::new();
    let checks = CheckTally::new();
    let api = CouponApi::new(client_result.client, &config.server_host, requests.clone());
    info!(base_url = api.base_url(), "Targeting coupon service");

    let scenario = Arc::new(CouponScenario::new(
        api,
        config.to_setup_options(),
        config.issue_latency_budget,
        checks.clone(),
    ));

    let report = lifecycle::run(scenario, &config.to_executor(), ISSUE_SCENARIO).await?;

    let thresholds = evaluate_all(
        &config.thresholds,
        &ThresholdInputs {
            requests: &requests,
            checks: &checks,
            iterations: report.execution.completed,
            dropped_iterations: report.execution.dropped,
        },
    );

    for result in thresholds.iter().filter(|r| !r.passed) {
        warn!(
            threshold = %result.threshold.source,
            observed = ?result.observed,
            "Threshold crossed"
        );
    }

    let summary = RunSummary {
        checks: &checks,
        requests: &requests,
        execution: &report.execution,
        teardown: &report.teardown,
        thresholds: &thresholds,
    }
    .render();

    info!(
        requests_per_second = requests.requests_per_second(),
        thresholds_passed = thresholds.iter().all(|r| r.passed),
        "Load test finished"
    );

    Ok(RunOutcome {
        execution: report.execution,
        teardown: report.teardown,
        thresholds,
        summary,
    })
}
