//! One coupon issuance attempt per iteration.

use std::time::Duration;
use tracing::{debug, warn};

use crate::api::CouponApi;
use crate::checks::{check, fail_all, Check, CheckTally};
use crate::envelope::IssueOutcome;
use crate::metrics::COUPON_ISSUE_OUTCOMES;
use crate::protocol::{Endpoint, IssueCouponRequest};
use crate::scenario::{WorkloadContext, ISSUE_SCENARIO};
use crate::utils::generate_uuid;

pub const VALID_STATUS_CHECK: &str = "Status is valid (200 or 400)";
pub const LATENCY_CHECK: &str = "Response time is acceptable";

/// Checks applied to every `IssueCoupon` response. A 400 is a legitimate
/// answer under load (campaign exhausted, user drawn twice).
pub fn issue_checks(latency_budget: Duration) -> Vec<Check> {
    vec![
        Check::new(VALID_STATUS_CHECK, |r| r.status == 200 || r.status == 400),
        Check::new(LATENCY_CHECK, move |r| r.duration < latency_budget),
    ]
}

/// Issues one coupon to a fresh synthetic user. Never fails: problems show up
/// as failed checks and request metrics.
pub async fn issue_coupon(
    api: &CouponApi,
    ctx: &WorkloadContext,
    checks: &[Check],
    tally: &CheckTally,
) {
    if !ctx.is_ready() {
        warn!("No campaign ID available, skipping coupon issuance");
        return;
    }

    let payload = IssueCouponRequest {
        campaign_id: ctx.campaign_id.clone(),
        user_id: generate_uuid(),
    };

    match api.call(Endpoint::IssueCoupon, ISSUE_SCENARIO, &payload).await {
        Ok(response) => {
            check(&response, checks, tally);

            if response.status == 200 || response.status == 400 {
                let outcome = IssueOutcome::classify(&response.body);
                COUPON_ISSUE_OUTCOMES
                    .with_label_values(&[outcome.label()])
                    .inc();
                if response.status == 400 && !outcome.is_expected_rejection() {
                    debug!(
                        outcome = ?outcome,
                        user_id = %payload.user_id,
                        body = %response.body,
                        "Coupon issuance rejected"
                    );
                }
            }
        }
        Err(e) => {
            debug!(error = %e, user_id = %payload.user_id, "Coupon issuance request failed");
            fail_all(checks, tally);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RpcResponse;

    fn response(status: u16, millis: u64) -> RpcResponse {
        RpcResponse {
            status,
            body: "{}".to_string(),
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_issue_checks() {
        let checks = issue_checks(Duration::from_millis(200));
        assert_eq!(checks[0].name(), VALID_STATUS_CHECK);
        assert_eq!(checks[1].name(), LATENCY_CHECK);

        assert!(checks[0].evaluate(&response(200, 1)));
        assert!(checks[0].evaluate(&response(400, 1)));
        assert!(!checks[0].evaluate(&response(404, 1)));
        assert!(!checks[0].evaluate(&response(500, 1)));

        assert!(checks[1].evaluate(&response(200, 199)));
        assert!(!checks[1].evaluate(&response(200, 200)));
    }
}
