//! Wire-level constants and request payloads for the coupon service.
//!
//! The service speaks the Connect protocol with JSON bodies: every call is an
//! HTTP POST to `/<package>.<Service>/<Method>`.

use serde::Serialize;

/// Header that marks a request as Connect protocol version 1.
pub const CONNECT_PROTOCOL_VERSION_HEADER: &str = "connect-protocol-version";

/// Headers sent with every call. Names are lowercase so they can be used as
/// static `HeaderName`s; HTTP header names are case-insensitive on the wire.
pub const CONNECT_HEADERS: [(&str, &str); 3] = [
    ("content-type", "application/json"),
    (CONNECT_PROTOCOL_VERSION_HEADER, "1"),
    ("accept", "application/json"),
];

/// RPC endpoints exposed by the coupon service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    CreateCampaign,
    IssueCoupon,
    GetCampaign,
}

impl Endpoint {
    pub const ALL: [Endpoint; 3] = [
        Endpoint::CreateCampaign,
        Endpoint::IssueCoupon,
        Endpoint::GetCampaign,
    ];

    /// Request path relative to the server root.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::CreateCampaign => "/io.coupon.service.GreetService/CreateCampaign",
            Endpoint::IssueCoupon => "/io.coupon.service.GreetService/IssueCoupon",
            Endpoint::GetCampaign => "/io.coupon.service.GreetService/GetCampaign",
        }
    }

    /// Prometheus label for this endpoint.
    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::CreateCampaign => "CreateCampaign",
            Endpoint::IssueCoupon => "IssueCoupon",
            Endpoint::GetCampaign => "GetCampaign",
        }
    }
}

/// Builds the base URL for a `host:port` target.
///
/// Hosts given with an explicit scheme are used as-is.
pub fn base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

/// Payload for `CreateCampaign`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub amount: u64,
    pub issued_at: String,
    pub expires_at: String,
}

/// Payload for `IssueCoupon`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IssueCouponRequest {
    pub campaign_id: String,
    pub user_id: String,
}

/// Payload for `GetCampaign`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GetCampaignRequest {
    pub id: String,
}
