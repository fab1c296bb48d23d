//! Background job scheduler.
//!
//! Each [`Job`] gets its own repeating timer on a [`JobScheduler`] and its own
//! [`JobRunner`], which owns the skip-if-running guard and the per-cycle
//! ceiling. Cycles are spawned on a shared [`TaskTracker`] so shutdown can
//! wait for them.

mod runner;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_cron_scheduler::{Job as CronJob, JobScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub use runner::{JobRunner, TickOutcome};

/// Per-cycle context handed to [`Job::run`].
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Cancelled on shutdown or when the cycle exceeds its ceiling.
    pub cancel: CancellationToken,
    pub started_at: DateTime<Utc>,
}

/// A recurring unit of work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Run one cycle. Per-item failures are handled inside; an `Err` means
    /// the cycle as a whole could not proceed.
    async fn run(&self, ctx: &JobContext) -> anyhow::Result<()>;
}

/// Running scheduler handle. Keep it alive for the lifetime of the process.
pub struct Scheduler {
    cron: JobScheduler,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Register every job on its interval, fire each once immediately, and
    /// start the timers.
    ///
    /// # Errors
    ///
    /// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
    /// a job cannot be registered, or the scheduler fails to start.
    pub async fn start(
        jobs: Vec<Arc<dyn Job>>,
        ceiling_multiplier: u32,
    ) -> Result<Self, JobSchedulerError> {
        let cron = JobScheduler::new().await?;
        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();

        for job in jobs {
            let interval = job.interval();
            let runner = Arc::new(JobRunner::new(
                job,
                ceiling_multiplier,
                shutdown.clone(),
            ));

            let tick_runner = Arc::clone(&runner);
            let tick_tracker = tracker.clone();
            let cron_job = CronJob::new_repeated_async(interval, move |_uuid, _lock| {
                let runner = Arc::clone(&tick_runner);
                let tracker = tick_tracker.clone();
                Box::pin(async move {
                    tracker.spawn(async move {
                        runner.tick().await;
                    });
                })
            })?;
            cron.add(cron_job).await?;

            tracing::info!(
                job = runner.name(),
                interval_secs = interval.as_secs(),
                "scheduler: job registered"
            );
            tracker.spawn(async move {
                runner.tick().await;
            });
        }

        cron.start().await?;
        Ok(Self {
            cron,
            tracker,
            shutdown,
        })
    }

    /// Stop new ticks, wait up to `grace` for in-flight cycles, then cancel
    /// whatever is still running. Cancelled cycles are dropped at their next
    /// await point, so this returns promptly after the grace period.
    pub async fn shutdown(mut self, grace: Duration) {
        if let Err(e) = self.cron.shutdown().await {
            tracing::warn!(error = %e, "scheduler: failed to stop timers cleanly");
        }
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                grace_secs = grace.as_secs(),
                "scheduler: cycles still running after grace period, cancelling"
            );
            self.shutdown.cancel();
            self.tracker.wait().await;
        }
        tracing::info!("scheduler: stopped");
    }
}

/// Run every job exactly once, in order, under the same ceiling rules as
/// scheduled ticks. Returns `true` if all of them completed.
pub async fn run_once(jobs: Vec<Arc<dyn Job>>, ceiling_multiplier: u32) -> bool {
    let shutdown = CancellationToken::new();
    let mut all_ok = true;
    for job in jobs {
        let runner = JobRunner::new(job, ceiling_multiplier, shutdown.clone());
        all_ok &= runner.tick().await == TickOutcome::Completed;
    }
    all_ok
}
