use std::sync::Arc;

use chrono::Utc;
use rin_db::DbError;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::sink::{DeliveryError, MessageSink};

/// Counts for one notification cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub pending: usize,
    pub posted: usize,
    pub failed: usize,
    pub abandoned: usize,
}

/// Posts valid, unposted coupons to a sink, oldest first.
pub struct Notifier {
    sink: Arc<dyn MessageSink>,
    max_attempts: u32,
}

impl Notifier {
    #[must_use]
    pub fn new(sink: Arc<dyn MessageSink>, max_attempts: u32) -> Self {
        Self {
            sink,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run one notification cycle.
    ///
    /// Messages go out one at a time in discovery order. A coupon is marked
    /// posted only after the sink confirms delivery, so a crash in between
    /// can produce a duplicate post but never a lost one.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] only if the pending rows cannot be selected.
    pub async fn run_cycle(
        &self,
        pool: &SqlitePool,
        cancel: &CancellationToken,
    ) -> Result<NotifyReport, DbError> {
        let pending = rin_db::list_pending_notifications(pool).await?;
        let mut report = NotifyReport {
            pending: pending.len(),
            ..NotifyReport::default()
        };

        for row in pending {
            if cancel.is_cancelled() {
                tracing::info!("notify: cancelled, remaining coupons wait for the next cycle");
                break;
            }

            let message = row.message();
            let delivery = tokio::select! {
                () = cancel.cancelled() => break,
                res = self.sink.send(&message) => res,
            };

            match delivery {
                Ok(()) => match rin_db::mark_posted(pool, row.id).await {
                    Ok(true) => {
                        report.posted += 1;
                        tracing::info!(coupon_id = row.id, source = %row.source, "notify: posted");
                    }
                    Ok(false) => {
                        // Invalidated between selection and delivery.
                        tracing::debug!(coupon_id = row.id, "notify: row no longer eligible after send");
                    }
                    Err(e) => {
                        tracing::error!(coupon_id = row.id, error = %e, "notify: sent but failed to mark posted");
                    }
                },
                Err(DeliveryError::Transient(reason)) => {
                    report.failed += 1;
                    match rin_db::record_delivery_failure(pool, row.id, self.max_attempts, Utc::now())
                        .await
                    {
                        Ok(state) if state.abandoned => {
                            report.abandoned += 1;
                            tracing::warn!(
                                coupon_id = row.id,
                                attempts = state.delivery_failures,
                                error = %reason,
                                "notify: giving up on coupon after repeated delivery failures"
                            );
                        }
                        Ok(state) => {
                            tracing::warn!(
                                coupon_id = row.id,
                                attempts = state.delivery_failures,
                                error = %reason,
                                "notify: delivery failed, will retry next cycle"
                            );
                        }
                        Err(e) => {
                            tracing::error!(coupon_id = row.id, error = %e, "notify: failed to record delivery failure");
                        }
                    }
                }
                Err(DeliveryError::Rejected(reason)) => {
                    report.failed += 1;
                    match rin_db::abandon_notification(pool, row.id, Utc::now()).await {
                        Ok(()) => {
                            report.abandoned += 1;
                            tracing::warn!(coupon_id = row.id, error = %reason, "notify: delivery rejected, coupon abandoned");
                        }
                        Err(e) => {
                            tracing::error!(coupon_id = row.id, error = %e, "notify: failed to abandon coupon");
                        }
                    }
                }
            }
        }

        if report.pending > 0 {
            tracing::info!(
                pending = report.pending,
                posted = report.posted,
                failed = report.failed,
                abandoned = report.abandoned,
                "notify: cycle complete"
            );
        }
        Ok(report)
    }
}
