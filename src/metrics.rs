use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::{
    Encoder, Gauge, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{error, info};

pub const DEFAULT_METRIC_NAMESPACE: &str = "coupon_loadtest";

static CONFIGURED_NAMESPACE: OnceLock<String> = OnceLock::new();

/// Sets the namespace every metric is created under. Only effective before
/// the first metric is touched; returns false when it came too late.
pub fn init_namespace(namespace: &str) -> bool {
    CONFIGURED_NAMESPACE.set(namespace.to_string()).is_ok()
}

lazy_static::lazy_static! {
    pub static ref METRIC_NAMESPACE: String = CONFIGURED_NAMESPACE
        .get_or_init(|| DEFAULT_METRIC_NAMESPACE.to_string())
        .clone();

    // === Request Metrics ===

    pub static ref REQUEST_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("requests_total", "Total number of RPC calls made")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["endpoint"]
        ).unwrap();

    pub static ref REQUEST_STATUS_CODES: IntCounterVec =
        IntCounterVec::new(
            Opts::new("requests_status_codes_total", "Number of RPC calls by endpoint and status code")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["endpoint", "status_code"]
        ).unwrap();

    pub static ref REQUEST_FAILED_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("requests_failed_total", "RPC calls that errored or returned a 4xx/5xx status")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["endpoint"]
        ).unwrap();

    pub static ref REQUEST_ERRORS_BY_CATEGORY: IntCounterVec =
        IntCounterVec::new(
            Opts::new("request_errors_by_category_total", "Failed RPC calls by error category")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["category"]
        ).unwrap();

    pub static ref CONCURRENT_REQUESTS: Gauge =
        Gauge::with_opts(
            Opts::new("concurrent_requests", "Number of RPC calls currently in flight")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref REQUEST_DURATION_SECONDS: HistogramVec =
        HistogramVec::new(
            prometheus::HistogramOpts::new(
                "request_duration_seconds",
                "RPC call latencies in seconds."
            )
            .namespace(METRIC_NAMESPACE.as_str())
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.3, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["endpoint"]
        ).unwrap();

    // === Check Metrics ===

    pub static ref CHECKS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("checks_total", "Response checks evaluated")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["check", "result"]  // result: passed, failed
        ).unwrap();

    pub static ref COUPON_ISSUE_OUTCOMES: IntCounterVec =
        IntCounterVec::new(
            Opts::new("coupon_issue_outcomes_total", "IssueCoupon results by business outcome")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["outcome"]
        ).unwrap();

    // === Executor Metrics ===

    pub static ref ITERATIONS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("iterations_total", "Completed workload iterations")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["scenario"]
        ).unwrap();

    pub static ref DROPPED_ITERATIONS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("dropped_iterations_total", "Iterations not started because no VU was free")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["scenario"]
        ).unwrap();

    pub static ref ITERATION_DURATION_SECONDS: HistogramVec =
        HistogramVec::new(
            prometheus::HistogramOpts::new(
                "iteration_duration_seconds",
                "Workload iteration duration in seconds"
            ).namespace(METRIC_NAMESPACE.as_str()),
            &["scenario"]
        ).unwrap();

    pub static ref VUS_ACTIVE: IntGauge =
        IntGauge::with_opts(
            Opts::new("vus_active", "Virtual users currently running an iteration")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref VUS_ALLOCATED: IntGauge =
        IntGauge::with_opts(
            Opts::new("vus_allocated", "Virtual users allocated so far")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();
}

/// Registers all metrics with the default Prometheus registry.
pub fn register_metrics() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = prometheus::default_registry();

    // Request metrics
    registry.register(Box::new(REQUEST_TOTAL.clone()))?;
    registry.register(Box::new(REQUEST_STATUS_CODES.clone()))?;
    registry.register(Box::new(REQUEST_FAILED_TOTAL.clone()))?;
    registry.register(Box::new(REQUEST_ERRORS_BY_CATEGORY.clone()))?;
    registry.register(Box::new(CONCURRENT_REQUESTS.clone()))?;
    registry.register(Box::new(REQUEST_DURATION_SECONDS.clone()))?;

    // Check metrics
    registry.register(Box::new(CHECKS_TOTAL.clone()))?;
    registry.register(Box::new(COUPON_ISSUE_OUTCOMES.clone()))?;

    // Executor metrics
    registry.register(Box::new(ITERATIONS_TOTAL.clone()))?;
    registry.register(Box::new(DROPPED_ITERATIONS_TOTAL.clone()))?;
    registry.register(Box::new(ITERATION_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(VUS_ACTIVE.clone()))?;
    registry.register(Box::new(VUS_ALLOCATED.clone()))?;

    Ok(())
}

fn encode_registry(registry: &Mutex<Registry>) -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = match registry.lock() {
        Ok(guard) => guard.gather(),
        Err(poisoned) => poisoned.into_inner().gather(),
    };
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

/// HTTP handler for the Prometheus metrics endpoint.
pub async fn metrics_handler(
    _req: Request<Body>,
    registry: Arc<Mutex<Registry>>,
) -> Result<Response<Body>, hyper::Error> {
    let response = match encode_registry(&registry) {
        Ok(buffer) => {
            let mut response = Response::new(Body::from(buffer));
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            let mut response = Response::new(Body::from("failed to encode metrics"));
            *response.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    };

    Ok(response)
}

/// Starts the Prometheus metrics HTTP server.
pub async fn start_metrics_server(port: u16, registry: Arc<Mutex<Registry>>) {
    let addr = ([0, 0, 0, 0], port).into();

    let make_svc = make_service_fn(move |_conn| {
        let registry_clone = registry.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let registry_clone_inner = registry_clone.clone();
                async move { metrics_handler(req, registry_clone_inner).await }
            }))
        }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(port = port, error = %e, "Failed to bind metrics server");
            return;
        }
    };
    info!(
        port = port,
        addr = %addr,
        "Metrics server listening"
    );

    if let Err(e) = server.await {
        error!(error = %e, "Metrics server error");
    }
}

/// Gathers and encodes metrics as a string for final output.
pub fn gather_metrics_string(registry: &Arc<Mutex<Registry>>) -> String {
    match encode_registry(registry) {
        Ok(buffer) => String::from_utf8(buffer).unwrap_or_else(|e| {
            error!(error = %e, "Error encoding metrics to UTF-8");
            String::from("# ERROR ENCODING METRICS TO UTF-8")
        }),
        Err(e) => {
            error!(error = %e, "Error encoding metrics");
            String::from("# ERROR ENCODING METRICS")
        }
    }
}
