use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::{Job, JobContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    Failed,
    /// The previous cycle was still running, or shutdown had begun.
    Skipped,
    /// Cancelled after exceeding the per-cycle ceiling.
    Abandoned,
    /// Dropped mid-cycle because shutdown was forced.
    Cancelled,
}

/// Drives one job: at most one active cycle, each bounded by a ceiling.
pub struct JobRunner {
    job: Arc<dyn Job>,
    ceiling: Duration,
    running: AtomicBool,
    shutdown: CancellationToken,
}

/// Clears the running flag however the cycle ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl JobRunner {
    #[must_use]
    pub fn new(job: Arc<dyn Job>, ceiling_multiplier: u32, shutdown: CancellationToken) -> Self {
        let ceiling = job
            .interval()
            .checked_mul(ceiling_multiplier.max(1))
            .unwrap_or(Duration::MAX);
        Self {
            job,
            ceiling,
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.job.name()
    }

    pub async fn tick(&self) -> TickOutcome {
        let job = self.job.name();
        if self.shutdown.is_cancelled() {
            return TickOutcome::Skipped;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(job, "scheduler: previous cycle still running, skipping tick");
            return TickOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        let ctx = JobContext {
            cancel: self.shutdown.child_token(),
            started_at: Utc::now(),
        };
        let started = Instant::now();
        tracing::info!(job, "scheduler: cycle starting");

        let run = tokio::time::timeout(self.ceiling, self.job.run(&ctx));
        let res = tokio::select! {
            () = self.shutdown.cancelled() => {
                tracing::warn!(job, "scheduler: cycle dropped by forced shutdown");
                return TickOutcome::Cancelled;
            }
            res = run => res,
        };

        match res {
            Ok(Ok(())) => {
                tracing::info!(
                    job,
                    elapsed_ms = started.elapsed().as_millis(),
                    "scheduler: cycle complete"
                );
                TickOutcome::Completed
            }
            Ok(Err(e)) => {
                tracing::error!(job, error = %e, "scheduler: cycle failed");
                TickOutcome::Failed
            }
            Err(_) => {
                ctx.cancel.cancel();
                tracing::error!(
                    job,
                    ceiling_secs = self.ceiling.as_secs(),
                    "scheduler: cycle exceeded its ceiling and was cancelled"
                );
                TickOutcome::Abandoned
            }
        }
    }
}
