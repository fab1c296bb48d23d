use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use rin_db::{CouponRow, DbError};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::breaker::SourceBreaker;
use crate::check::{CheckRegistry, ProbeOutcome};

/// A century; keeps `now - staleness` representable.
const MAX_STALENESS_HOURS: u64 = 24 * 365 * 100;

#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    pub max_concurrent: usize,
    pub probe_timeout: Duration,
    /// Valid rows older than this are re-checked.
    pub staleness: chrono::Duration,
    pub unknown_threshold: u32,
}

impl ValidatorConfig {
    #[must_use]
    pub fn from_app_config(config: &rin_core::AppConfig) -> Self {
        Self {
            max_concurrent: config.validation_max_concurrent.max(1),
            probe_timeout: Duration::from_secs(config.validation_timeout_secs),
            staleness: chrono::Duration::hours(
                i64::try_from(config.validation_staleness_hours.min(MAX_STALENESS_HOURS))
                    .unwrap_or_default(),
            ),
            unknown_threshold: config.validation_unknown_threshold,
        }
    }
}

/// Counts for one validation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub due: usize,
    pub valid: usize,
    pub invalid: usize,
    pub unknown: usize,
    /// Rows that went invalid because inconclusive probes hit the threshold.
    pub downgraded: usize,
    /// Rows not probed: breaker open or cycle cancelled.
    pub skipped: usize,
    pub store_errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowResult {
    Probed {
        outcome: ProbeOutcome,
        downgraded: bool,
    },
    Skipped,
    StoreError,
}

/// Probes due coupons and records the verdicts.
pub struct Validator {
    checks: Arc<CheckRegistry>,
    breaker: Arc<SourceBreaker>,
    client: Client,
    config: ValidatorConfig,
}

impl Validator {
    #[must_use]
    pub fn new(
        checks: CheckRegistry,
        breaker: SourceBreaker,
        client: Client,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            checks: Arc::new(checks),
            breaker: Arc::new(breaker),
            client,
            config,
        }
    }

    #[must_use]
    pub fn breaker(&self) -> &SourceBreaker {
        &self.breaker
    }

    /// Run one validation cycle.
    ///
    /// Probes run in spawned tasks, at most `max_concurrent` at a time, each
    /// bounded by `probe_timeout` (a timeout counts as `Unknown`). Every
    /// verdict is written in its own statement as soon as it is known.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] only if the due rows cannot be selected; per-row
    /// write failures are logged and counted in the report.
    pub async fn run_cycle(
        &self,
        pool: &SqlitePool,
        cancel: &CancellationToken,
    ) -> Result<ValidationReport, DbError> {
        let now = Utc::now();
        let due = rin_db::list_due_for_validation(pool, now - self.config.staleness).await?;
        self.breaker.begin_cycle();

        let mut report = ValidationReport {
            due: due.len(),
            ..ValidationReport::default()
        };
        if due.is_empty() {
            tracing::debug!("validate: nothing due");
            return Ok(report);
        }

        let results: Vec<RowResult> = stream::iter(due)
            .map(|row| {
                let task = ProbeTask {
                    checks: Arc::clone(&self.checks),
                    breaker: Arc::clone(&self.breaker),
                    client: self.client.clone(),
                    pool: pool.clone(),
                    cancel: cancel.clone(),
                    config: self.config,
                };
                async move {
                    let id = row.id;
                    match tokio::spawn(task.run(row)).await {
                        Ok(result) => result,
                        Err(e) => {
                            tracing::error!(coupon_id = id, error = %e, "validate: probe task failed");
                            RowResult::Skipped
                        }
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                RowResult::Probed {
                    outcome,
                    downgraded,
                } => {
                    match outcome {
                        ProbeOutcome::Valid => report.valid += 1,
                        ProbeOutcome::Invalid => report.invalid += 1,
                        ProbeOutcome::Unknown => report.unknown += 1,
                    }
                    if downgraded {
                        report.downgraded += 1;
                    }
                }
                RowResult::Skipped => report.skipped += 1,
                RowResult::StoreError => report.store_errors += 1,
            }
        }

        tracing::info!(
            due = report.due,
            valid = report.valid,
            invalid = report.invalid,
            unknown = report.unknown,
            downgraded = report.downgraded,
            skipped = report.skipped,
            "validate: cycle complete"
        );
        Ok(report)
    }
}

/// Everything one spawned probe needs, owned.
struct ProbeTask {
    checks: Arc<CheckRegistry>,
    breaker: Arc<SourceBreaker>,
    client: Client,
    pool: SqlitePool,
    cancel: CancellationToken,
    config: ValidatorConfig,
}

impl ProbeTask {
    async fn run(self, row: CouponRow) -> RowResult {
        if self.cancel.is_cancelled() || !self.breaker.allows(&row.source) {
            return RowResult::Skipped;
        }

        // Rows past their stated expiry are still checked; purge retires them.
        let check = self.checks.for_source(&row.source);
        let probe = tokio::time::timeout(self.config.probe_timeout, check.check(&row, &self.client));
        let outcome = tokio::select! {
            () = self.cancel.cancelled() => return RowResult::Skipped,
            res = probe => res.unwrap_or(ProbeOutcome::Unknown),
        };
        self.breaker.record(&row.source, outcome);

        let now = Utc::now();
        let write = match outcome {
            ProbeOutcome::Valid | ProbeOutcome::Invalid => {
                rin_db::record_validation_result(
                    &self.pool,
                    row.id,
                    outcome == ProbeOutcome::Valid,
                    now,
                )
                .await
                .map(|()| false)
            }
            ProbeOutcome::Unknown => rin_db::record_inconclusive_validation(
                &self.pool,
                row.id,
                self.config.unknown_threshold,
                now,
            )
            .await
            .map(|state| row.is_valid && !state.is_valid),
        };

        match write {
            Ok(downgraded) => {
                if downgraded {
                    tracing::warn!(
                        coupon_id = row.id,
                        source = %row.source,
                        "validate: repeated inconclusive probes, marking invalid"
                    );
                } else if row.is_valid != (outcome == ProbeOutcome::Valid)
                    && outcome != ProbeOutcome::Unknown
                {
                    tracing::info!(coupon_id = row.id, source = %row.source, ?outcome, "validate: validity changed");
                }
                RowResult::Probed {
                    outcome,
                    downgraded,
                }
            }
            Err(DbError::NotFound) => {
                tracing::debug!(coupon_id = row.id, "validate: row purged during probe");
                RowResult::Skipped
            }
            Err(e) => {
                tracing::error!(coupon_id = row.id, error = %e, "validate: failed to record result");
                RowResult::StoreError
            }
        }
    }
}
