//! Coupon service RPC calls.
//!
//! [`CouponApi::call`] is the single place where requests leave the process:
//! it serializes the payload, POSTs it, reads the whole body and records the
//! standard request metrics (Prometheus plus the in-process [`RequestStats`])
//! before handing back an [`RpcResponse`].

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::errors::{status_code_label, ErrorCategory};
use crate::metrics::{
    CONCURRENT_REQUESTS, REQUEST_DURATION_SECONDS, REQUEST_ERRORS_BY_CATEGORY,
    REQUEST_FAILED_TOTAL, REQUEST_STATUS_CODES, REQUEST_TOTAL,
};
use crate::protocol::{base_url, Endpoint};
use crate::stats::RequestStats;

/// What came back from one RPC call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub status: u16,
    pub body: String,
    /// Time from sending the request until the body was fully read.
    pub duration: Duration,
}

/// Holds one slot of the in-flight gauge until dropped, so a call future
/// cancelled mid-request still releases it.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        CONCURRENT_REQUESTS.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        CONCURRENT_REQUESTS.dec();
    }
}

/// Client for the coupon service's Connect endpoints.
#[derive(Clone)]
pub struct CouponApi {
    client: reqwest::Client,
    base_url: String,
    stats: RequestStats,
}

impl CouponApi {
    /// `host` is `host:port` or a full base URL.
    pub fn new(client: reqwest::Client, host: &str, stats: RequestStats) -> Self {
        Self {
            client,
            base_url: base_url(host),
            stats,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    pub fn stats(&self) -> &RequestStats {
        &self.stats
    }

    /// POSTs `payload` as JSON to `endpoint`, tagging the call with `scenario`.
    pub async fn call<T: Serialize + ?Sized>(
        &self,
        endpoint: Endpoint,
        scenario: &str,
        payload: &T,
    ) -> Result<RpcResponse, reqwest::Error> {
        let url = self.url(endpoint);
        let label = endpoint.label();

        let in_flight = InFlight::enter();
        REQUEST_TOTAL.with_label_values(&[label]).inc();
        let start = Instant::now();

        let result = self.send(&url, payload).await;

        let duration = start.elapsed();
        drop(in_flight);
        REQUEST_DURATION_SECONDS
            .with_label_values(&[label])
            .observe(duration.as_secs_f64());

        match result {
            Ok((status, body)) => {
                REQUEST_STATUS_CODES
                    .with_label_values(&[label, status_code_label(status)])
                    .inc();

                let category = ErrorCategory::from_status_code(status);
                if let Some(category) = category {
                    REQUEST_FAILED_TOTAL.with_label_values(&[label]).inc();
                    REQUEST_ERRORS_BY_CATEGORY
                        .with_label_values(&[category.label()])
                        .inc();
                }
                self.stats.record(scenario, duration, category.is_some());

                debug!(
                    endpoint = label,
                    scenario = scenario,
                    status_code = status,
                    duration_ms = duration.as_millis() as u64,
                    "Request completed"
                );

                Ok(RpcResponse {
                    status,
                    body,
                    duration,
                })
            }
            Err(e) => {
                let category = ErrorCategory::from_reqwest_error(&e);
                REQUEST_STATUS_CODES
                    .with_label_values(&[label, "error"])
                    .inc();
                REQUEST_FAILED_TOTAL.with_label_values(&[label]).inc();
                REQUEST_ERRORS_BY_CATEGORY
                    .with_label_values(&[category.label()])
                    .inc();
                self.stats.record(scenario, duration, true);

                warn!(
                    endpoint = label,
                    scenario = scenario,
                    error = %e,
                    error_category = category.label(),
                    "Request failed"
                );

                Err(e)
            }
        }
    }

    async fn send<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<(u16, String), reqwest::Error> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}
