use std::env;
use std::str::FromStr;
use thiserror::Error;
use tokio::time::Duration;

use crate::client::ClientConfig;
use crate::executor::ConstantArrivalRate;
use crate::logging::LogFormat;
use crate::metrics::DEFAULT_METRIC_NAMESPACE;
use crate::setup::SetupOptions;
use crate::thresholds::{default_thresholds, parse_threshold_list, Threshold, ThresholdError};
use crate::utils::parse_duration_string;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be a valid number, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Invalid {var} format: '{value}'. {message}")]
    InvalidDuration {
        var: &'static str,
        value: String,
        message: String,
    },

    #[error("{var} {message}")]
    OutOfRange { var: &'static str, message: String },

    #[error("Invalid LOG_FORMAT: {0}")]
    InvalidLogFormat(String),

    #[error("Invalid THRESHOLDS: {0}")]
    InvalidThreshold(#[from] ThresholdError),
}

/// Main configuration for the load test.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    /// Coupon issuance attempts per second
    pub request_rate: u64,
    pub duration: Duration,
    pub coupon_amount: u64,
    pub pre_allocated_vus: usize,
    pub max_vus: usize,
    pub graceful_stop: Duration,
    pub setup_settle: Duration,
    pub request_timeout: Duration,
    pub issue_latency_budget: Duration,
    pub custom_headers: Option<String>,
    /// None disables the exporter
    pub metrics_port: Option<u16>,
    /// Prefix of every exported metric name
    pub metric_namespace: String,
    pub log_format: LogFormat,
    pub thresholds: Vec<Threshold>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`. Unset and empty values both fall
    /// back to the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server_host = get("SERVER_HOST").unwrap_or_else(|| "localhost:8080".to_string());

        let request_rate: u64 = parse_number(&get, "REQUEST_RATE", 700)?;
        if request_rate == 0 {
            return Err(ConfigError::OutOfRange {
                var: "REQUEST_RATE",
                message: "must be greater than 0".to_string(),
            });
        }

        let duration = parse_duration(&get, "DURATION", "1m")?;
        if duration.is_zero() {
            return Err(ConfigError::OutOfRange {
                var: "DURATION",
                message: "must be greater than 0".to_string(),
            });
        }

        let coupon_amount: u64 = parse_number(&get, "COUPON_AMOUNT", 10_000)?;
        if coupon_amount == 0 {
            return Err(ConfigError::OutOfRange {
                var: "COUPON_AMOUNT",
                message: "must be greater than 0".to_string(),
            });
        }

        let pre_allocated_vus: usize = parse_number(&get, "PRE_ALLOCATED_VUS", 100)?;
        let max_vus: usize = parse_number(&get, "MAX_VUS", 200)?;
        if max_vus == 0 {
            return Err(ConfigError::OutOfRange {
                var: "MAX_VUS",
                message: "must be greater than 0".to_string(),
            });
        }
        if pre_allocated_vus > max_vus {
            return Err(ConfigError::OutOfRange {
                var: "PRE_ALLOCATED_VUS",
                message: format!("({}) must not exceed MAX_VUS ({})", pre_allocated_vus, max_vus),
            });
        }

        let graceful_stop = parse_duration(&get, "GRACEFUL_STOP", "30s")?;
        let setup_settle = parse_duration(&get, "SETUP_SETTLE", "1s")?;
        let request_timeout = parse_duration(&get, "REQUEST_TIMEOUT", "60s")?;

        let latency_budget_ms: u64 = parse_number(&get, "ISSUE_LATENCY_BUDGET_MS", 200)?;
        let issue_latency_budget = Duration::from_millis(latency_budget_ms);

        let custom_headers = get("CUSTOM_HEADERS");

        let metrics_port: u16 = parse_number(&get, "METRICS_PORT", 9090)?;
        let metrics_port = (metrics_port != 0).then_some(metrics_port);
        let metric_namespace =
            get("METRIC_NAMESPACE").unwrap_or_else(|| DEFAULT_METRIC_NAMESPACE.to_string());

        let log_format = match get("LOG_FORMAT") {
            Some(v) => LogFormat::from_str(&v).map_err(ConfigError::InvalidLogFormat)?,
            None => LogFormat::default(),
        };

        let thresholds = match get("THRESHOLDS") {
            Some(v) => parse_threshold_list(&v)?,
            None => default_thresholds(),
        };

        Ok(Config {
            server_host,
            request_rate,
            duration,
            coupon_amount,
            pre_allocated_vus,
            max_vus,
            graceful_stop,
            setup_settle,
            request_timeout,
            issue_latency_budget,
            custom_headers,
            metrics_port,
            metric_namespace,
            log_format,
            thresholds,
        })
    }

    /// Creates a ClientConfig from this Config.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: self.request_timeout,
            max_idle_per_host: self.max_vus,
            custom_headers: self.custom_headers.clone(),
        }
    }

    pub fn to_executor(&self) -> ConstantArrivalRate {
        ConstantArrivalRate {
            rate: self.request_rate,
            time_unit: Duration::from_secs(1),
            duration: self.duration,
            pre_allocated_vus: self.pre_allocated_vus,
            max_vus: self.max_vus,
            graceful_stop: self.graceful_stop,
        }
    }

    pub fn to_setup_options(&self) -> SetupOptions {
        SetupOptions {
            coupon_amount: self.coupon_amount,
            settle: self.setup_settle,
        }
    }

    /// Prints the configuration summary.
    pub fn print_summary(&self, parsed_headers: &reqwest::header::HeaderMap) {
        println!("Starting coupon load test:");
        println!("  Server: {}", self.server_host);
        println!("  Request rate: {}/s", self.request_rate);
        println!("  Duration: {:?}", self.duration);
        println!("  Coupon amount: {}", self.coupon_amount);
        println!(
            "  VUs: {} pre-allocated, {} max",
            self.pre_allocated_vus, self.max_vus
        );
        println!("  Graceful stop: {:?}", self.graceful_stop);
        println!("  Request timeout: {:?}", self.request_timeout);
        println!(
            "  Issue latency budget: {}ms",
            self.issue_latency_budget.as_millis()
        );

        match self.metrics_port {
            Some(port) => println!("  Metrics endpoint: 0.0.0.0:{}/metrics", port),
            None => println!("  Metrics endpoint: disabled"),
        }
        println!("  Metric namespace: {}", self.metric_namespace);

        println!("  Headers:");
        for (name, value) in parsed_headers.iter() {
            println!(
                "    {}: {}",
                name,
                value.to_str().unwrap_or("<non-ASCII or sensitive value>")
            );
        }

        println!("  Thresholds:");
        for threshold in &self.thresholds {
            println!("    {}", threshold.source);
        }
    }
}

fn parse_number<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        None => Ok(default),
    }
}

fn parse_duration<G>(get: &G, var: &'static str, default: &str) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = get(var).unwrap_or_else(|| default.to_string());
    parse_duration_string(&value).map_err(|message| ConfigError::InvalidDuration {
        var,
        value,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_host, "localhost:8080");
        assert_eq!(config.request_rate, 700);
        assert_eq!(config.duration, Duration::from_secs(60));
        assert_eq!(config.coupon_amount, 10_000);
        assert_eq!(config.pre_allocated_vus, 100);
        assert_eq!(config.max_vus, 200);
        assert_eq!(config.graceful_stop, Duration::from_secs(30));
        assert_eq!(config.setup_settle, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.issue_latency_budget, Duration::from_millis(200));
        assert_eq!(config.metrics_port, Some(9090));
        assert_eq!(config.metric_namespace, "coupon_loadtest");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.thresholds.len(), 3);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("SERVER_HOST", "coupon:9000"),
            ("REQUEST_RATE", "50"),
            ("DURATION", "1m30s"),
            ("COUPON_AMOUNT", "25"),
            ("METRICS_PORT", "0"),
            ("METRIC_NAMESPACE", "coupons_ci"),
            ("LOG_FORMAT", "json"),
            ("THRESHOLDS", "checks=rate>0.9"),
        ])
        .unwrap();

        assert_eq!(config.server_host, "coupon:9000");
        assert_eq!(config.request_rate, 50);
        assert_eq!(config.duration, Duration::from_secs(90));
        assert_eq!(config.coupon_amount, 25);
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.metric_namespace, "coupons_ci");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.thresholds.len(), 1);

        let executor = config.to_executor();
        assert_eq!(executor.rate, 50);
        assert_eq!(executor.duration, Duration::from_secs(90));
        assert_eq!(config.to_setup_options().coupon_amount, 25);
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let config = config_from(&[("REQUEST_RATE", ""), ("SERVER_HOST", "  ")]).unwrap();
        assert_eq!(config.request_rate, 700);
        assert_eq!(config.server_host, "localhost:8080");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[("REQUEST_RATE", "fast")]),
            Err(ConfigError::InvalidNumber { var: "REQUEST_RATE", .. })
        ));
        assert!(matches!(
            config_from(&[("REQUEST_RATE", "0")]),
            Err(ConfigError::OutOfRange { var: "REQUEST_RATE", .. })
        ));
        assert!(matches!(
            config_from(&[("DURATION", "10x")]),
            Err(ConfigError::InvalidDuration { var: "DURATION", .. })
        ));
        assert!(matches!(
            config_from(&[("COUPON_AMOUNT", "0")]),
            Err(ConfigError::OutOfRange { var: "COUPON_AMOUNT", .. })
        ));
        assert!(matches!(
            config_from(&[("DURATION", "300000000000000000d")]),
            Err(ConfigError::InvalidDuration { var: "DURATION", .. })
        ));
        assert!(matches!(
            config_from(&[("GRACEFUL_STOP", "18446744073709551615s1s")]),
            Err(ConfigError::InvalidDuration { var: "GRACEFUL_STOP", .. })
        ));
        assert!(matches!(
            config_from(&[("PRE_ALLOCATED_VUS", "300")]),
            Err(ConfigError::OutOfRange { var: "PRE_ALLOCATED_VUS", .. })
        ));
        assert!(matches!(
            config_from(&[("LOG_FORMAT", "xml")]),
            Err(ConfigError::InvalidLogFormat(_))
        ));
        assert!(matches!(
            config_from(&[("THRESHOLDS", "http_reqs=count<1")]),
            Err(ConfigError::InvalidThreshold(_))
        ));
    }
}
