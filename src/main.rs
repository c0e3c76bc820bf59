use std::sync::{Arc, Mutex};
use tracing::{error, warn};

use coupon_loadtest::config::Config;
use coupon_loadtest::logging;
use coupon_loadtest::metrics::{
    self, gather_metrics_string, register_metrics, start_metrics_server,
};
use coupon_loadtest::runner::run_load_test;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("Environment variables (all optional):");
    eprintln!("  SERVER_HOST             - Coupon service host:port or base URL (default: localhost:8080)");
    eprintln!("  REQUEST_RATE            - IssueCoupon calls per second (default: 700)");
    eprintln!("  DURATION                - Load duration: 30s, 1m, 1m30s (default: 1m)");
    eprintln!("  COUPON_AMOUNT           - Coupons in the created campaign (default: 10000)");
    eprintln!();
    eprintln!("Executor configuration:");
    eprintln!("  PRE_ALLOCATED_VUS       - VUs allocated up front (default: 100)");
    eprintln!("  MAX_VUS                 - VU ceiling; iterations are dropped beyond it (default: 200)");
    eprintln!("  GRACEFUL_STOP           - Time in-flight iterations get after DURATION (default: 30s)");
    eprintln!("  SETUP_SETTLE            - Pause after campaign creation (default: 1s)");
    eprintln!("  REQUEST_TIMEOUT         - Per-request timeout (default: 60s)");
    eprintln!("  ISSUE_LATENCY_BUDGET_MS - Latency check limit for IssueCoupon (default: 200)");
    eprintln!();
    eprintln!("Advanced configuration:");
    eprintln!("  CUSTOM_HEADERS          - Comma-separated headers (use \\, for literal commas)");
    eprintln!("  THRESHOLDS              - metric=expr;... e.g. http_req_duration=p(95)<500");
    eprintln!("  METRICS_PORT            - Prometheus exporter port, 0 disables (default: 9090)");
    eprintln!("  METRIC_NAMESPACE        - Prometheus metric namespace (default: coupon_loadtest)");
    eprintln!("  LOG_FORMAT              - text or json (default: text)");
    eprintln!("  RUST_LOG                - Log filter (default: info)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration from environment variables
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    logging::init(config.log_format);

    if !metrics::init_namespace(&config.metric_namespace) {
        warn!(
            namespace = %config.metric_namespace,
            "Metric namespace was fixed before configuration was loaded"
        );
    }

    // Register Prometheus metrics
    register_metrics()?;
    let registry_arc = Arc::new(Mutex::new(prometheus::default_registry().clone()));

    if let Some(metrics_port) = config.metrics_port {
        let registry = registry_arc.clone();
        tokio::spawn(async move {
            start_metrics_server(metrics_port, registry).await;
        });
    }

    let outcome = match run_load_test(&config).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Load test aborted");
            std::process::exit(1);
        }
    };

    println!("{}", outcome.summary);

    // Gather and print final metrics
    let final_metrics_output = gather_metrics_string(&registry_arc);
    println!("\n--- FINAL METRICS ---\n{}", final_metrics_output);
    println!("--- END OF FINAL METRICS ---\n");

    let code = outcome.exit_code();
    if code != 0 {
        error!(exit_code = code, "Some thresholds have failed");
        std::process::exit(code);
    }

    Ok(())
}
