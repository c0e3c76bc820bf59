//! Final campaign report after the load stops.

use tracing::{info, warn};

use crate::api::CouponApi;
use crate::envelope::{issued_coupon_count, locate_campaign};
use crate::protocol::{Endpoint, GetCampaignRequest};
use crate::scenario::{WorkloadContext, TEARDOWN_SCENARIO};

/// What the teardown query found out.
#[derive(Debug, Clone, PartialEq)]
pub enum TeardownReport {
    /// No campaign to query
    Skipped,
    Completed {
        issued: u64,
        amount: u64,
        percent: f64,
    },
    /// 200 response without a campaign object
    CampaignMissing,
    QueryFailed { status: u16 },
    RequestFailed(String),
    ParseFailed(String),
}

impl TeardownReport {
    pub fn describe(&self) -> String {
        match self {
            TeardownReport::Skipped => "skipped (no campaign)".to_string(),
            TeardownReport::Completed {
                issued,
                amount,
                percent,
            } => format!("{}/{} ({:.2}%)", issued, amount, percent),
            TeardownReport::CampaignMissing => "campaign not found in response".to_string(),
            TeardownReport::QueryFailed { status } => format!("query failed with status {}", status),
            TeardownReport::RequestFailed(e) => format!("request failed: {}", e),
            TeardownReport::ParseFailed(e) => format!("unparseable response: {}", e),
        }
    }
}

/// Share of the campaign that was issued, in percent. Zero for an empty campaign.
pub fn completion_percent(issued: u64, amount: u64) -> f64 {
    if amount == 0 {
        0.0
    } else {
        issued as f64 / amount as f64 * 100.0
    }
}

/// Queries the campaign and logs how much of it was issued. Failures are
/// logged and reported, never returned as errors.
pub async fn report_final_state(api: &CouponApi, ctx: &WorkloadContext) -> TeardownReport {
    if !ctx.is_ready() {
        warn!("No campaign ID available, skipping final campaign report");
        return TeardownReport::Skipped;
    }

    let payload = GetCampaignRequest {
        id: ctx.campaign_id.clone(),
    };

    let response = match api.call(Endpoint::GetCampaign, TEARDOWN_SCENARIO, &payload).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, campaign_id = %ctx.campaign_id, "Failed to query final campaign state");
            return TeardownReport::RequestFailed(e.to_string());
        }
    };

    if response.status != 200 {
        warn!(
            status_code = response.status,
            campaign_id = %ctx.campaign_id,
            body = %response.body,
            "Failed to get final campaign state"
        );
        return TeardownReport::QueryFailed {
            status: response.status,
        };
    }

    let body: serde_json::Value = match serde_json::from_str(&response.body) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, body = %response.body, "Failed to parse final campaign state");
            return TeardownReport::ParseFailed(e.to_string());
        }
    };

    let Some(campaign) = locate_campaign(&body) else {
        warn!(body = %response.body, "Final campaign state has no campaign");
        return TeardownReport::CampaignMissing;
    };

    let issued = issued_coupon_count(campaign);
    let percent = completion_percent(issued, ctx.coupon_amount);

    info!(
        campaign_id = %ctx.campaign_id,
        issued = issued,
        amount = ctx.coupon_amount,
        "Final campaign state: {}/{} coupons issued ({:.2}%)",
        issued,
        ctx.coupon_amount,
        percent
    );

    TeardownReport::Completed {
        issued,
        amount: ctx.coupon_amount,
        percent,
    }
}
