//! Config::from_env against the real process environment.

use coupon_loadtest::config::{Config, ConfigError};
use serial_test::serial;
use std::env;
use std::time::Duration;

const VARS: [&str; 6] = [
    "SERVER_HOST",
    "REQUEST_RATE",
    "DURATION",
    "COUPON_AMOUNT",
    "CUSTOM_HEADERS",
    "THRESHOLDS",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.server_host, "localhost:8080");
    assert_eq!(config.request_rate, 700);
    assert_eq!(config.duration, Duration::from_secs(60));
    assert_eq!(config.coupon_amount, 10_000);
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    env::set_var("SERVER_HOST", "coupon.internal:8080");
    env::set_var("REQUEST_RATE", "1200");
    env::set_var("DURATION", "5m");
    env::set_var("COUPON_AMOUNT", "500");
    env::set_var("CUSTOM_HEADERS", "Authorization:Bearer abc");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.server_host, "coupon.internal:8080");
    assert_eq!(config.request_rate, 1200);
    assert_eq!(config.duration, Duration::from_secs(300));
    assert_eq!(config.coupon_amount, 500);
    assert_eq!(
        config.to_client_config().custom_headers.as_deref(),
        Some("Authorization:Bearer abc")
    );
}

#[test]
#[serial]
fn test_from_env_rejects_bad_rate() {
    clear_env();
    env::set_var("REQUEST_RATE", "seven hundred");

    let result = Config::from_env();
    clear_env();

    assert!(matches!(
        result,
        Err(ConfigError::InvalidNumber {
            var: "REQUEST_RATE",
            ..
        })
    ));
}
