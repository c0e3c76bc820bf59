//! Campaign creation before the load starts.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::api::CouponApi;
use crate::envelope::extract_campaign_id;
use crate::protocol::{CreateCampaignRequest, Endpoint};
use crate::scenario::{WorkloadContext, SETUP_SCENARIO};
use crate::utils::{format_timestamp, hours_delta};

/// Name given to campaigns created by the load test.
pub const CAMPAIGN_NAME: &str = "LoadTest";

/// How long a created campaign stays valid.
pub const CAMPAIGN_VALIDITY_HOURS: f64 = 24.0;

/// Anything that stops the run before the first iteration.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Campaign creation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Campaign creation failed with status {status}: {body}")]
    CampaignCreation { status: u16, body: String },

    #[error("Campaign creation response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Could not extract campaign ID from response: {body}")]
    CampaignIdNotFound { body: String },
}

#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub coupon_amount: u64,
    /// Pause after creation so the service can settle.
    pub settle: Duration,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            coupon_amount: 10_000,
            settle: Duration::from_secs(1),
        }
    }
}

/// Payload for a campaign valid from `now` for [`CAMPAIGN_VALIDITY_HOURS`].
pub fn campaign_request(coupon_amount: u64, now: DateTime<Utc>) -> CreateCampaignRequest {
    CreateCampaignRequest {
        name: CAMPAIGN_NAME.to_string(),
        amount: coupon_amount,
        issued_at: format_timestamp(now),
        expires_at: format_timestamp(now + hours_delta(CAMPAIGN_VALIDITY_HOURS)),
    }
}

/// Pulls the campaign id out of a CreateCampaign response body.
pub fn parse_campaign_id(body: &str) -> Result<String, SetupError> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    extract_campaign_id(&value).ok_or_else(|| SetupError::CampaignIdNotFound {
        body: body.to_string(),
    })
}

/// Creates the campaign every iteration issues coupons from.
pub async fn create_campaign(
    api: &CouponApi,
    options: &SetupOptions,
) -> Result<WorkloadContext, SetupError> {
    let payload = campaign_request(options.coupon_amount, Utc::now());

    info!(
        url = %api.url(Endpoint::CreateCampaign),
        amount = payload.amount,
        issued_at = %payload.issued_at,
        expires_at = %payload.expires_at,
        "Creating campaign"
    );

    let response = api
        .call(Endpoint::CreateCampaign, SETUP_SCENARIO, &payload)
        .await?;

    debug!(status_code = response.status, body = %response.body, "Campaign creation response");

    if response.status != 200 {
        error!(
            status_code = response.status,
            body = %response.body,
            "Campaign creation failed"
        );
        return Err(SetupError::CampaignCreation {
            status: response.status,
            body: response.body,
        });
    }

    let campaign_id = parse_campaign_id(&response.body).map_err(|e| {
        error!(error = %e, "Could not read campaign id");
        e
    })?;

    info!(campaign_id = %campaign_id, "Campaign created");

    if !options.settle.is_zero() {
        tokio::time::sleep(options.settle).await;
    }

    Ok(WorkloadContext::new(campaign_id, options.coupon_amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_campaign_request_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let req = campaign_request(500, now);

        assert_eq!(req.name, "LoadTest");
        assert_eq!(req.amount, 500);
        assert_eq!(req.issued_at, "2024-03-01T12:00:00.000Z");
        assert_eq!(req.expires_at, "2024-03-02T12:00:00.000Z");
        assert!(req.expires_at > req.issued_at);
    }

    #[test]
    fn test_parse_campaign_id() {
        assert_eq!(
            parse_campaign_id(r#"{"data":{"campaign":{"id":"abc"}}}"#).unwrap(),
            "abc"
        );
        assert!(matches!(
            parse_campaign_id("not json"),
            Err(SetupError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_campaign_id(r#"{"data":{}}"#),
            Err(SetupError::CampaignIdNotFound { .. })
        ));
    }
}
