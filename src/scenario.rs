//! The coupon issuance scenario: shared context and the lifecycle wiring of
//! its three stages.

use async_trait::async_trait;
use std::time::Duration;

use crate::api::CouponApi;
use crate::checks::{Check, CheckTally};
use crate::lifecycle::Workload;
use crate::setup::{create_campaign, SetupError, SetupOptions};
use crate::teardown::{report_final_state, TeardownReport};
use crate::workload::{issue_checks, issue_coupon};

/// Scenario label for the campaign creation call.
pub const SETUP_SCENARIO: &str = "setup";
/// Scenario label for the constant-rate coupon issuance calls.
pub const ISSUE_SCENARIO: &str = "issue_coupons";
/// Scenario label for the final campaign query.
pub const TEARDOWN_SCENARIO: &str = "teardown";

/// What setup hands to every later stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadContext {
    pub campaign_id: String,
    pub coupon_amount: u64,
}

impl WorkloadContext {
    pub fn new(campaign_id: impl Into<String>, coupon_amount: u64) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            coupon_amount,
        }
    }

    /// Work only happens against a known campaign.
    pub fn is_ready(&self) -> bool {
        !self.campaign_id.is_empty()
    }
}

/// Create a campaign, hammer `IssueCoupon`, then report how much was issued.
pub struct CouponScenario {
    api: CouponApi,
    setup: SetupOptions,
    checks: Vec<Check>,
    tally: CheckTally,
}

impl CouponScenario {
    pub fn new(
        api: CouponApi,
        setup: SetupOptions,
        latency_budget: Duration,
        tally: CheckTally,
    ) -> Self {
        Self {
            api,
            setup,
            checks: issue_checks(latency_budget),
            tally,
        }
    }
}

#[async_trait]
impl Workload for CouponScenario {
    type Context = WorkloadContext;
    type Error = SetupError;
    type Report = TeardownReport;

    async fn setup(&self) -> Result<WorkloadContext, SetupError> {
        create_campaign(&self.api, &self.setup).await
    }

    async fn iteration(&self, ctx: &WorkloadContext) {
        issue_coupon(&self.api, ctx, &self.checks, &self.tally).await;
    }

    async fn teardown(&self, ctx: &WorkloadContext) -> TeardownReport {
        report_final_state(&self.api, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_readiness() {
        assert!(WorkloadContext::new("c-1", 10).is_ready());
        assert!(!WorkloadContext::new("", 10).is_ready());
    }
}
