//! Constant arrival rate execution.
//!
//! Iterations are started on a fixed schedule regardless of how long earlier
//! ones take. Each running iteration holds one virtual user (VU) from a
//! bounded pool; when the pool is exhausted the due iteration is dropped and
//! counted, never queued, so a slow target cannot push the schedule back.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::metrics::{
    DROPPED_ITERATIONS_TOTAL, ITERATIONS_TOTAL, ITERATION_DURATION_SECONDS, VUS_ACTIVE,
    VUS_ALLOCATED,
};

/// Starts `rate` iterations per `time_unit` for `duration`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantArrivalRate {
    pub rate: u64,
    pub time_unit: Duration,
    pub duration: Duration,
    pub pre_allocated_vus: usize,
    pub max_vus: usize,
    /// How long in-flight iterations may keep running after `duration`.
    pub graceful_stop: Duration,
}

impl Default for ConstantArrivalRate {
    fn default() -> Self {
        Self {
            rate: 700,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(60),
            pre_allocated_vus: 100,
            max_vus: 200,
            graceful_stop: Duration::from_secs(30),
        }
    }
}

/// Counters for one executor run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub started: u64,
    pub completed: u64,
    pub dropped: u64,
    /// Still running when the graceful stop window closed
    pub interrupted: u64,
    pub panicked: u64,
    /// Most VUs busy at the same time
    pub max_vus_used: usize,
    pub elapsed: Duration,
}

/// Marks a VU busy for as long as its iteration runs, including when the
/// task is aborted.
struct ActiveVu {
    _permit: OwnedSemaphorePermit,
}

impl ActiveVu {
    fn new(permit: OwnedSemaphorePermit) -> Self {
        VUS_ACTIVE.inc();
        Self { _permit: permit }
    }
}

impl Drop for ActiveVu {
    fn drop(&mut self) {
        VUS_ACTIVE.dec();
    }
}

impl ConstantArrivalRate {
    /// Offset of iteration `n` from the start, `n * time_unit / rate`.
    /// Rounding never accumulates across iterations.
    fn offset_of(&self, n: u64) -> Duration {
        let nanos = self.time_unit.as_nanos() * u128::from(n) / u128::from(self.rate.max(1));
        Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
    }

    /// Number of iterations the schedule contains.
    pub fn planned_iterations(&self) -> u64 {
        let scheduled = self.duration.as_nanos() * u128::from(self.rate.max(1));
        let time_unit = self.time_unit.as_nanos().max(1);
        scheduled.div_ceil(time_unit).min(u128::from(u64::MAX)) as u64
    }

    /// Start time of iteration `n`, counted from `start`.
    fn due_at(&self, start: Instant, n: u64) -> Instant {
        start + self.offset_of(n)
    }

    /// Runs the schedule, calling `iteration` once per started iteration.
    pub async fn run<F, Fut>(&self, scenario: &str, iteration: F) -> ExecutionReport
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let max_vus = self.max_vus.max(1);
        let vus = Arc::new(Semaphore::new(max_vus));
        let allocated = Arc::new(AtomicUsize::new(self.pre_allocated_vus.min(max_vus)));
        VUS_ALLOCATED.set(allocated.load(Ordering::Relaxed) as i64);

        info!(
            scenario = scenario,
            rate = self.rate,
            time_unit_ms = self.time_unit.as_millis() as u64,
            duration_secs = self.duration.as_secs_f64(),
            pre_allocated_vus = self.pre_allocated_vus,
            max_vus = max_vus,
            planned_iterations = self.planned_iterations(),
            "Starting constant arrival rate executor"
        );

        let iteration = Arc::new(iteration);
        let mut tasks = JoinSet::new();
        let mut report = ExecutionReport::default();
        let mut warned_insufficient_vus = false;

        let start = Instant::now();
        let deadline = start + self.duration;
        let mut n: u64 = 0;

        loop {
            let next_fire = self.due_at(start, n);
            if next_fire >= deadline {
                break;
            }
            // Past-due fires return at once, so a late timer catches up.
            time::sleep_until(next_fire).await;
            n += 1;

            while let Some(result) = tasks.try_join_next() {
                Self::account(&mut report, result);
            }

            let permit = match vus.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    report.dropped += 1;
                    DROPPED_ITERATIONS_TOTAL
                        .with_label_values(&[scenario])
                        .inc();
                    if !warned_insufficient_vus {
                        warn!(
                            scenario = scenario,
                            max_vus = max_vus,
                            "Insufficient VUs, reached {} active VUs and cannot start more iterations",
                            max_vus
                        );
                        warned_insufficient_vus = true;
                    }
                    continue;
                }
            };

            let in_use = max_vus - vus.available_permits();
            report.max_vus_used = report.max_vus_used.max(in_use);
            if in_use > allocated.load(Ordering::Relaxed) {
                allocated.store(in_use, Ordering::Relaxed);
                VUS_ALLOCATED.set(in_use as i64);
                debug!(scenario = scenario, vus = in_use, "Allocated additional VU");
            }

            report.started += 1;
            let iteration = Arc::clone(&iteration);
            let scenario_label = scenario.to_string();

            tasks.spawn(async move {
                let _vu = ActiveVu::new(permit);
                let iteration_start = Instant::now();

                iteration().await;

                ITERATION_DURATION_SECONDS
                    .with_label_values(&[&scenario_label])
                    .observe(iteration_start.elapsed().as_secs_f64());
                ITERATIONS_TOTAL.with_label_values(&[&scenario_label]).inc();
            });
        }

        debug!(
            scenario = scenario,
            in_flight = tasks.len(),
            graceful_stop_secs = self.graceful_stop.as_secs_f64(),
            "Schedule finished, waiting for in-flight iterations"
        );

        let drain = async {
            while let Some(result) = tasks.join_next().await {
                Self::account(&mut report, result);
            }
        };
        if time::timeout(self.graceful_stop, drain).await.is_err() {
            let interrupted = tasks.len() as u64;
            warn!(
                scenario = scenario,
                interrupted = interrupted,
                "Graceful stop window elapsed, aborting in-flight iterations"
            );
            tasks.shutdown().await;
            report.interrupted = interrupted;
        }

        report.elapsed = start.elapsed();

        info!(
            scenario = scenario,
            started = report.started,
            completed = report.completed,
            dropped = report.dropped,
            interrupted = report.interrupted,
            max_vus_used = report.max_vus_used,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Executor finished"
        );

        report
    }

    fn account(report: &mut ExecutionReport, result: Result<(), JoinError>) {
        match result {
            Ok(()) => report.completed += 1,
            Err(e) if e.is_panic() => {
                error!(error = %e, "Iteration panicked");
                report.panicked += 1;
            }
            Err(_) => {}
        }
    }
}
