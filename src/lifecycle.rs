//! setup → constant-rate iterations → teardown.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::client::ClientError;
use crate::executor::{ConstantArrivalRate, ExecutionReport};

/// A load test split into its three stages.
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    /// Produced once by setup and shared read-only by every iteration.
    type Context: Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;
    type Report: Send;

    async fn setup(&self) -> Result<Self::Context, Self::Error>;

    /// One unit of work. Must not fail; problems are recorded as checks.
    async fn iteration(&self, ctx: &Self::Context);

    /// Runs once after the executor stops. Must not fail.
    async fn teardown(&self, ctx: &Self::Context) -> Self::Report;
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Setup failed: {0}")]
    Setup(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Outcome of a full run.
#[derive(Debug)]
pub struct LifecycleReport<R> {
    pub execution: ExecutionReport,
    pub teardown: R,
}

/// Runs setup, then the executor, then teardown. A setup error stops the run
/// before any iteration starts.
pub async fn run<W: Workload>(
    workload: Arc<W>,
    executor: &ConstantArrivalRate,
    scenario: &str,
) -> Result<LifecycleReport<W::Report>, RunError> {
    info!(scenario = scenario, "Running setup");
    let ctx = match workload.setup().await {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!(error = %e, "Setup failed, no iterations will run");
            return Err(RunError::Setup(Box::new(e)));
        }
    };

    let execution = {
        let workload = Arc::clone(&workload);
        let ctx = Arc::clone(&ctx);
        executor
            .run(scenario, move || {
                let workload = Arc::clone(&workload);
                let ctx = Arc::clone(&ctx);
                async move { workload.iteration(&ctx).await }
            })
            .await
    };

    info!(scenario = scenario, "Running teardown");
    let teardown = workload.teardown(&ctx).await;

    Ok(LifecycleReport {
        execution,
        teardown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    struct Counting {
        fail_setup: bool,
        iterations: AtomicU64,
    }

    #[async_trait]
    impl Workload for Counting {
        type Context = u64;
        type Error = Boom;
        type Report = u64;

        async fn setup(&self) -> Result<u64, Boom> {
            if self.fail_setup {
                Err(Boom)
            } else {
                Ok(7)
            }
        }

        async fn iteration(&self, ctx: &u64) {
            assert_eq!(*ctx, 7);
            self.iterations.fetch_add(1, Ordering::SeqCst);
        }

        async fn teardown(&self, _ctx: &u64) -> u64 {
            self.iterations.load(Ordering::SeqCst)
        }
    }

    fn executor() -> ConstantArrivalRate {
        ConstantArrivalRate {
            rate: 50,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_millis(200),
            pre_allocated_vus: 2,
            max_vus: 5,
            graceful_stop: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_setup_failure_runs_no_iterations() {
        let workload = Arc::new(Counting {
            fail_setup: true,
            iterations: AtomicU64::new(0),
        });

        let result = run(Arc::clone(&workload), &executor(), "test").await;

        assert!(matches!(result, Err(RunError::Setup(_))));
        assert_eq!(workload.iterations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_teardown_sees_every_iteration() {
        let workload = Arc::new(Counting {
            fail_setup: false,
            iterations: AtomicU64::new(0),
        });

        let report = run(Arc::clone(&workload), &executor(), "test")
            .await
            .unwrap();

        assert_eq!(report.execution.started, 10);
        assert_eq!(report.execution.completed, 10);
        assert_eq!(report.teardown, 10);
    }
}
