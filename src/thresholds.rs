//! Pass/fail thresholds over the aggregated run metrics.
//!
//! Thresholds use the familiar `metric{tag:value}` + `aggregation op value`
//! syntax, for example `http_req_duration{scenario:issue_coupons}` with
//! `p(95)<200`. Any failed threshold makes the process exit with
//! [`THRESHOLDS_FAILED_EXIT_CODE`].

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::checks::CheckTally;
use crate::stats::RequestStats;

/// Exit code used when at least one threshold fails.
pub const THRESHOLDS_FAILED_EXIT_CODE: i32 = 99;

/// Thresholds applied when none are configured.
pub const DEFAULT_THRESHOLDS: [(&str, &str); 3] = [
    ("http_req_duration", "p(95)<500"),
    ("http_req_duration{scenario:issue_coupons}", "p(95)<200"),
    ("http_req_failed", "rate<0.05"),
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("Unknown threshold metric '{0}'")]
    UnknownMetric(String),

    #[error("Unsupported tag filter '{0}'. Only '{{scenario:<name>}}' is supported")]
    UnsupportedTag(String),

    #[error("Invalid threshold expression '{0}'. Expected e.g. 'p(95)<500' or 'rate<0.05'")]
    InvalidExpression(String),

    #[error("Aggregation '{aggregation}' is not available for metric '{metric}'")]
    UnsupportedAggregation { metric: String, aggregation: String },

    #[error("Invalid threshold entry '{0}'. Expected 'metric=expression'")]
    InvalidEntry(String),
}

/// Metrics a threshold can be declared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricName {
    /// Request latency in milliseconds
    HttpReqDuration,
    /// Fraction of failed requests
    HttpReqFailed,
    /// Fraction of passed checks
    Checks,
    /// Iterations that completed
    Iterations,
    /// Iterations dropped for lack of a free VU
    DroppedIterations,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::HttpReqDuration => "http_req_duration",
            MetricName::HttpReqFailed => "http_req_failed",
            MetricName::Checks => "checks",
            MetricName::Iterations => "iterations",
            MetricName::DroppedIterations => "dropped_iterations",
        }
    }

    fn supports(&self, aggregation: &Aggregation) -> bool {
        match self {
            MetricName::HttpReqDuration => matches!(
                aggregation,
                Aggregation::Percentile(_)
                    | Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Max
                    | Aggregation::Med
            ),
            MetricName::HttpReqFailed | MetricName::Checks => {
                matches!(aggregation, Aggregation::Rate)
            }
            MetricName::Iterations | MetricName::DroppedIterations => {
                matches!(aggregation, Aggregation::Count)
            }
        }
    }
}

impl FromStr for MetricName {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http_req_duration" => Ok(MetricName::HttpReqDuration),
            "http_req_failed" => Ok(MetricName::HttpReqFailed),
            "checks" => Ok(MetricName::Checks),
            "iterations" => Ok(MetricName::Iterations),
            "dropped_iterations" => Ok(MetricName::DroppedIterations),
            other => Err(ThresholdError::UnknownMetric(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    /// `p(N)`, N in 0..=100
    Percentile(f64),
    Avg,
    Min,
    Max,
    Med,
    Rate,
    Count,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Percentile(p) => write!(f, "p({})", p),
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Count => write!(f, "count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    pub fn apply(&self, observed: f64, limit: f64) -> bool {
        match self {
            Comparison::Lt => observed < limit,
            Comparison::Le => observed <= limit,
            Comparison::Gt => observed > limit,
            Comparison::Ge => observed >= limit,
            Comparison::Eq => (observed - limit).abs() < f64::EPSILON,
            Comparison::Ne => (observed - limit).abs() >= f64::EPSILON,
        }
    }
}

/// One parsed threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: MetricName,
    /// Restricts the metric to one scenario's requests
    pub scenario: Option<String>,
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub limit: f64,
    /// Original `metric` and `expression` text, for reporting
    pub source: String,
}

impl Threshold {
    /// Parses a metric key such as `http_req_duration{scenario:issue_coupons}`
    /// and an expression such as `p(95)<200`.
    pub fn parse(metric_key: &str, expression: &str) -> Result<Self, ThresholdError> {
        let (metric, scenario) = parse_metric_key(metric_key.trim())?;
        let (aggregation, comparison, limit) = parse_expression(expression.trim())?;

        if !metric.supports(&aggregation) {
            return Err(ThresholdError::UnsupportedAggregation {
                metric: metric.as_str().to_string(),
                aggregation: aggregation.to_string(),
            });
        }

        Ok(Self {
            metric,
            scenario,
            aggregation,
            comparison,
            limit,
            source: format!("{}: {}", metric_key.trim(), expression.trim()),
        })
    }

    /// Current value of this threshold's metric, or None when it has no data.
    pub fn observe(&self, inputs: &ThresholdInputs<'_>) -> Option<f64> {
        let scenario = self.scenario.as_deref();
        match self.metric {
            MetricName::HttpReqDuration => {
                let tracker = inputs.requests.latencies(scenario)?;
                let stats = tracker.stats()?;
                let micros = match self.aggregation {
                    Aggregation::Percentile(p) => tracker.value_at_quantile(p / 100.0)? as f64,
                    Aggregation::Avg => stats.mean,
                    Aggregation::Min => stats.min as f64,
                    Aggregation::Max => stats.max as f64,
                    Aggregation::Med => stats.p50 as f64,
                    Aggregation::Rate | Aggregation::Count => return None,
                };
                Some(micros / 1000.0)
            }
            MetricName::HttpReqFailed => {
                let counts = inputs.requests.counts(scenario);
                (counts.total > 0).then(|| counts.failed_rate())
            }
            MetricName::Checks => {
                let totals = inputs.checks.totals();
                (totals.total() > 0).then(|| totals.pass_rate())
            }
            MetricName::Iterations => Some(inputs.iterations as f64),
            MetricName::DroppedIterations => Some(inputs.dropped_iterations as f64),
        }
    }

    /// Evaluates the threshold. Metrics without data pass.
    pub fn evaluate(&self, inputs: &ThresholdInputs<'_>) -> ThresholdResult {
        let observed = self.observe(inputs);
        let passed = observed
            .map(|value| self.comparison.apply(value, self.limit))
            .unwrap_or(true);
        ThresholdResult {
            threshold: self.clone(),
            observed,
            passed,
        }
    }
}

fn parse_metric_key(key: &str) -> Result<(MetricName, Option<String>), ThresholdError> {
    match key.split_once('{') {
        None => Ok((key.parse()?, None)),
        Some((name, rest)) => {
            let tag = rest
                .strip_suffix('}')
                .ok_or_else(|| ThresholdError::UnsupportedTag(rest.to_string()))?;
            match tag.split_once(':') {
                Some(("scenario", value)) if !value.trim().is_empty() => {
                    Ok((name.trim().parse()?, Some(value.trim().to_string())))
                }
                _ => Err(ThresholdError::UnsupportedTag(tag.to_string())),
            }
        }
    }
}

fn parse_expression(expression: &str) -> Result<(Aggregation, Comparison, f64), ThresholdError> {
    let invalid = || ThresholdError::InvalidExpression(expression.to_string());

    let op_start = expression.find(['<', '>', '=', '!']).ok_or_else(invalid)?;
    let (lhs, rest) = expression.split_at(op_start);

    let (comparison, op_len) = if rest.starts_with("<=") {
        (Comparison::Le, 2)
    } else if rest.starts_with(">=") {
        (Comparison::Ge, 2)
    } else if rest.starts_with("==") {
        (Comparison::Eq, 2)
    } else if rest.starts_with("!=") {
        (Comparison::Ne, 2)
    } else if rest.starts_with('<') {
        (Comparison::Lt, 1)
    } else if rest.starts_with('>') {
        (Comparison::Gt, 1)
    } else {
        return Err(invalid());
    };

    let limit: f64 = rest[op_len..].trim().parse().map_err(|_| invalid())?;

    let lhs = lhs.trim();
    let aggregation = match lhs {
        "avg" => Aggregation::Avg,
        "min" => Aggregation::Min,
        "max" => Aggregation::Max,
        "med" => Aggregation::Med,
        "rate" => Aggregation::Rate,
        "count" => Aggregation::Count,
        _ => {
            let inner = lhs
                .strip_prefix("p(")
                .and_then(|s| s.strip_suffix(')'))
                .ok_or_else(invalid)?;
            let p: f64 = inner.trim().parse().map_err(|_| invalid())?;
            if !(0.0..=100.0).contains(&p) {
                return Err(invalid());
            }
            Aggregation::Percentile(p)
        }
    };

    Ok((aggregation, comparison, limit))
}

/// Parses `metric=expression;metric=expression`.
pub fn parse_threshold_list(s: &str) -> Result<Vec<Threshold>, ThresholdError> {
    s.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (metric, expression) = entry
                .split_once('=')
                .ok_or_else(|| ThresholdError::InvalidEntry(entry.to_string()))?;
            Threshold::parse(metric, expression)
        })
        .collect()
}

pub fn default_thresholds() -> Vec<Threshold> {
    DEFAULT_THRESHOLDS
        .iter()
        .filter_map(|(metric, expression)| Threshold::parse(metric, expression).ok())
        .collect()
}

/// Everything thresholds are evaluated against.
pub struct ThresholdInputs<'a> {
    pub requests: &'a RequestStats,
    pub checks: &'a CheckTally,
    pub iterations: u64,
    pub dropped_iterations: u64,
}

#[derive(Debug, Clone)]
pub struct ThresholdResult {
    pub threshold: Threshold,
    pub observed: Option<f64>,
    pub passed: bool,
}

pub fn evaluate_all(thresholds: &[Threshold], inputs: &ThresholdInputs<'_>) -> Vec<ThresholdResult> {
    thresholds.iter().map(|t| t.evaluate(inputs)).collect()
}
