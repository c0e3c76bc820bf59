pub mod api;
pub mod checks;
pub mod client;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod executor;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod percentiles;
pub mod protocol;
pub mod runner;
pub mod scenario;
pub mod setup;
pub mod stats;
pub mod summary;
pub mod teardown;
pub mod thresholds;
pub mod utils;
pub mod workload;
