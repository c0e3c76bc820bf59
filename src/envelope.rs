//! Tolerant parsing of coupon service response bodies.
//!
//! The service does not pin down how its payload is wrapped: the same message
//! has been seen as `{data: {...}}` and as `{value: {data: {...}}}`. Lookups
//! here try each known shape in a fixed order, and campaign id extraction
//! falls back to a bounded structural search.

use serde_json::{Map, Value};
use tracing::debug;

/// Depth limit for the structural id search.
pub const MAX_SEARCH_DEPTH: usize = 32;

/// A pure lookup of a campaign id in a parsed body.
pub type IdStrategy = fn(&Value) -> Option<String>;

/// Campaign id strategies in the order they are tried.
pub const CAMPAIGN_ID_STRATEGIES: [(&str, IdStrategy); 3] = [
    ("value.data.campaign.id", value_data_campaign_id),
    ("data.campaign.id", data_campaign_id),
    ("first object with id and name", first_named_id),
];

/// JSON pointers to the campaign object, in lookup order.
const CAMPAIGN_POINTERS: [&str; 2] = ["/value/data/campaign", "/data/campaign"];

/// JSON-style truthiness: `null`, `false`, `0` and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Converts an id field to a string. Only non-empty strings and non-zero
/// numbers qualify.
fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if is_truthy(value) => Some(n.to_string()),
        _ => None,
    }
}

pub fn value_data_campaign_id(body: &Value) -> Option<String> {
    body.pointer("/value/data/campaign/id").and_then(identifier)
}

pub fn data_campaign_id(body: &Value) -> Option<String> {
    body.pointer("/data/campaign/id").and_then(identifier)
}

/// Depth-first search for the first object with a truthy `id` and a truthy
/// `name`, returning its id.
pub fn first_named_id(body: &Value) -> Option<String> {
    find_named_id(body, 0, "")
}

fn find_named_id(value: &Value, depth: usize, path: &str) -> Option<String> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }

    match value {
        Value::Object(map) => {
            if let (Some(id), Some(name)) = (map.get("id"), map.get("name")) {
                if is_truthy(name) {
                    if let Some(id) = identifier(id) {
                        debug!(path = %format!("{}.id", path), id = %id, "Found id field");
                        return Some(id);
                    }
                }
            }
            map.iter().find_map(|(key, child)| {
                find_named_id(child, depth + 1, &format!("{}.{}", path, key))
            })
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(idx, child)| find_named_id(child, depth + 1, &format!("{}[{}]", path, idx))),
        _ => None,
    }
}

/// Runs the campaign id strategies in order; the first hit wins.
pub fn extract_campaign_id(body: &Value) -> Option<String> {
    CAMPAIGN_ID_STRATEGIES.iter().find_map(|(name, strategy)| {
        let id = strategy(body)?;
        debug!(strategy = *name, campaign_id = %id, "Campaign id extracted");
        Some(id)
    })
}

/// Locates the campaign object in either known envelope shape.
pub fn locate_campaign(body: &Value) -> Option<&Map<String, Value>> {
    CAMPAIGN_POINTERS
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(Value::as_object))
}

/// Number of issued coupons on a campaign object. A missing or null
/// collection counts as zero.
pub fn issued_coupon_count(campaign: &Map<String, Value>) -> u64 {
    campaign
        .get("issuedCoupons")
        .or_else(|| campaign.get("issued_coupons"))
        .and_then(Value::as_array)
        .map(|coupons| coupons.len() as u64)
        .unwrap_or(0)
}

/// Business outcome of an `IssueCoupon` call, read from its response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    /// `data.result` is true
    Issued,
    /// Every coupon of the campaign has been handed out
    Exhausted,
    /// The user already holds a coupon from this campaign
    Duplicate,
    /// Issuance has not started yet or has expired
    OutsideWindow,
    /// The campaign id is unknown to the service
    CampaignNotFound,
    /// Any other `badRequest` error
    BadRequest,
    /// `internalProblem` error
    InternalProblem,
    /// A Connect protocol error (`{code, message}`), e.g. a malformed request
    ProtocolError(String),
    /// Body did not match any known shape
    Unrecognized,
}

impl IssueOutcome {
    /// Classifies a response body. Unparseable bodies are `Unrecognized`.
    pub fn classify(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(_) => IssueOutcome::Unrecognized,
        }
    }

    pub fn from_value(body: &Value) -> Self {
        let root = body.get("value").unwrap_or(body);

        if let Some(data) = root.get("data") {
            if data.get("result").map(is_truthy).unwrap_or(false) {
                return IssueOutcome::Issued;
            }
        }

        if let Some(error) = root.get("error").and_then(Value::as_object) {
            if let Some(bad_request) = error.get("badRequest") {
                let message = bad_request
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_lowercase();
                return if message.contains("all coupons") {
                    IssueOutcome::Exhausted
                } else if message.contains("already issued") {
                    IssueOutcome::Duplicate
                } else if message.contains("not started") || message.contains("expired") {
                    IssueOutcome::OutsideWindow
                } else {
                    IssueOutcome::BadRequest
                };
            }
            if error.contains_key("notFound") {
                return IssueOutcome::CampaignNotFound;
            }
            if error.contains_key("internalProblem") {
                return IssueOutcome::InternalProblem;
            }
        }

        if let Some(code) = body.get("code").and_then(Value::as_str) {
            return IssueOutcome::ProtocolError(code.to_string());
        }

        IssueOutcome::Unrecognized
    }

    /// Prometheus label. Protocol errors are folded into one label.
    pub fn label(&self) -> &'static str {
        match self {
            IssueOutcome::Issued => "issued",
            IssueOutcome::Exhausted => "exhausted",
            IssueOutcome::Duplicate => "duplicate",
            IssueOutcome::OutsideWindow => "outside_window",
            IssueOutcome::CampaignNotFound => "campaign_not_found",
            IssueOutcome::BadRequest => "bad_request",
            IssueOutcome::InternalProblem => "internal_problem",
            IssueOutcome::ProtocolError(_) => "protocol_error",
            IssueOutcome::Unrecognized => "unrecognized",
        }
    }

    /// True for the outcomes a 400 is expected to mean under load: the
    /// campaign ran out or the same user was drawn twice.
    pub fn is_expected_rejection(&self) -> bool {
        matches!(self, IssueOutcome::Exhausted | IssueOutcome::Duplicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_from_all_three_shapes() {
        let shapes = [
            json!({"data": {"campaign": {"id": "X"}}}),
            json!({"value": {"data": {"campaign": {"id": "X"}}}}),
            json!({"foo": {"bar": {"id": "X", "name": "n"}}}),
        ];
        for body in &shapes {
            assert_eq!(extract_campaign_id(body).as_deref(), Some("X"), "body: {}", body);
            // Repeated extraction gives the same answer.
            assert_eq!(extract_campaign_id(body), extract_campaign_id(body));
        }
    }

    #[test]
    fn test_strategy_order() {
        let body = json!({
            "data": {"campaign": {"id": "outer"}},
            "value": {"data": {"campaign": {"id": "nested"}}}
        });
        assert_eq!(extract_campaign_id(&body).as_deref(), Some("nested"));
    }

    #[test]
    fn test_falls_through_when_fixed_path_id_is_empty() {
        let body = json!({
            "data": {"campaign": {"id": "", "name": "LoadTest"}},
            "other": {"id": "fallback", "name": "x"}
        });
        assert_eq!(extract_campaign_id(&body).as_deref(), Some("fallback"));
    }

    #[test]
    fn test_structural_search_requires_truthy_name() {
        let body = json!({
            "a": {"id": "no-name"},
            "b": {"id": "empty-name", "name": ""},
            "c": [{"id": "found", "name": "LoadTest"}]
        });
        assert_eq!(first_named_id(&body).as_deref(), Some("found"));
    }

    #[test]
    fn test_structural_search_visits_keys_in_document_order() {
        let body: Value =
            serde_json::from_str(r#"{"z": {"id": "first", "name": "a"}, "a": {"id": "second", "name": "b"}}"#)
                .unwrap();
        assert_eq!(first_named_id(&body).as_deref(), Some("first"));
    }

    #[test]
    fn test_numeric_ids_are_stringified() {
        let body = json!({"data": {"campaign": {"id": 42}}});
        assert_eq!(extract_campaign_id(&body).as_deref(), Some("42"));

        let zero = json!({"data": {"campaign": {"id": 0}}});
        assert_eq!(extract_campaign_id(&zero), None);
    }

    #[test]
    fn test_no_id_anywhere() {
        assert_eq!(extract_campaign_id(&json!({"data": {}})), None);
        assert_eq!(extract_campaign_id(&json!([1, 2, 3])), None);
        assert_eq!(extract_campaign_id(&json!("text")), None);
    }

    #[test]
    fn test_search_depth_is_bounded() {
        let mut body = json!({"id": "deep", "name": "n"});
        for _ in 0..(MAX_SEARCH_DEPTH + 5) {
            body = json!({ "next": body });
        }
        assert_eq!(first_named_id(&body), None);

        let mut shallow = json!({"id": "ok", "name": "n"});
        for _ in 0..(MAX_SEARCH_DEPTH - 1) {
            shallow = json!({ "next": shallow });
        }
        assert_eq!(first_named_id(&shallow).as_deref(), Some("ok"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("a")));
        assert!(is_truthy(&json!(1.5)));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn test_locate_campaign_and_count() {
        let nested = json!({"value": {"data": {"campaign": {"id": "c", "issuedCoupons": [{}, {}, {}]}}}});
        let flat = json!({"data": {"campaign": {"id": "c", "issued_coupons": [{}]}}});
        let empty = json!({"data": {"campaign": {"id": "c"}}});

        assert_eq!(issued_coupon_count(locate_campaign(&nested).unwrap()), 3);
        assert_eq!(issued_coupon_count(locate_campaign(&flat).unwrap()), 1);
        assert_eq!(issued_coupon_count(locate_campaign(&empty).unwrap()), 0);
        assert!(locate_campaign(&json!({"error": {}})).is_none());
    }

    #[test]
    fn test_issue_outcome_classification() {
        assert_eq!(
            IssueOutcome::classify(r#"{"data": {"result": true}}"#),
            IssueOutcome::Issued
        );
        assert_eq!(
            IssueOutcome::classify(
                r#"{"value": {"error": {"badRequest": {"message": "all coupons has been issued"}}}}"#
            ),
            IssueOutcome::Exhausted
        );
        assert_eq!(
            IssueOutcome::classify(
                r#"{"error": {"badRequest": {"message": "coupon already issued to this user"}}}"#
            ),
            IssueOutcome::Duplicate
        );
        assert_eq!(
            IssueOutcome::classify(
                r#"{"error": {"badRequest": {"message": "the coupon issuance period has expired"}}}"#
            ),
            IssueOutcome::OutsideWindow
        );
        assert_eq!(
            IssueOutcome::classify(r#"{"error": {"notFound": {"message": "x"}}}"#),
            IssueOutcome::CampaignNotFound
        );
        assert_eq!(
            IssueOutcome::classify(r#"{"code": "invalid_argument", "message": "bad"}"#),
            IssueOutcome::ProtocolError("invalid_argument".to_string())
        );
        assert_eq!(IssueOutcome::classify("not json"), IssueOutcome::Unrecognized);
    }

    #[test]
    fn test_expected_rejections() {
        assert!(IssueOutcome::Exhausted.is_expected_rejection());
        assert!(IssueOutcome::Duplicate.is_expected_rejection());
        assert!(!IssueOutcome::ProtocolError("invalid_argument".into()).is_expected_rejection());
        assert_eq!(IssueOutcome::ProtocolError("x".into()).label(), "protocol_error");
    }
}
