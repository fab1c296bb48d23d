//! The two recurring jobs and their wiring from [`AppConfig`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rin_core::AppConfig;
use rin_notifier::{DiscordWebhookSink, Notifier};
use rin_scraper::{
    register_builtin_sources, HttpFetcher, OrchestratorConfig, ScrapeOrchestrator, SourceRegistry,
};
use rin_validator::{CheckRegistry, SourceBreaker, Validator, ValidatorConfig};
use sqlx::SqlitePool;

use crate::archive::{ArchiveSink, RcloneArchive};
use crate::scheduler::{Job, JobContext};

/// Scrape every source, then validate due coupons, then post new valid ones.
pub struct ScrapeCycleJob {
    pool: SqlitePool,
    orchestrator: ScrapeOrchestrator,
    validator: Validator,
    notifier: Notifier,
    interval: Duration,
}

impl ScrapeCycleJob {
    #[must_use]
    pub fn new(
        pool: SqlitePool,
        orchestrator: ScrapeOrchestrator,
        validator: Validator,
        notifier: Notifier,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            orchestrator,
            validator,
            notifier,
            interval,
        }
    }
}

#[async_trait]
impl Job for ScrapeCycleJob {
    fn name(&self) -> &'static str {
        "scrape-cycle"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &JobContext) -> anyhow::Result<()> {
        let scrape = self.orchestrator.run_cycle(&self.pool, &ctx.cancel).await;
        if ctx.cancel.is_cancelled() {
            tracing::info!("scheduler: scrape cycle cancelled before validation");
            return Ok(());
        }

        let validation = self
            .validator
            .run_cycle(&self.pool, &ctx.cancel)
            .await
            .context("validation cycle could not select due coupons")?;
        if ctx.cancel.is_cancelled() {
            tracing::info!("scheduler: scrape cycle cancelled before notification");
            return Ok(());
        }

        let notify = self
            .notifier
            .run_cycle(&self.pool, &ctx.cancel)
            .await
            .context("notification cycle could not select pending coupons")?;

        tracing::info!(
            sources = scrape.sources.len(),
            failed_sources = scrape.failed(),
            inserted = scrape.inserted(),
            validated = validation.due - validation.skipped,
            posted = notify.posted,
            abandoned = notify.abandoned,
            "scheduler: scrape cycle summary"
        );
        Ok(())
    }
}

/// Purge coupons past their expiry plus the grace period, then kick off an
/// archive sync if one is configured.
pub struct CleanupJob {
    pool: SqlitePool,
    grace: chrono::Duration,
    archive: Option<Arc<dyn ArchiveSink>>,
    interval: Duration,
}

impl CleanupJob {
    #[must_use]
    pub fn new(
        pool: SqlitePool,
        grace_days: u32,
        archive: Option<Arc<dyn ArchiveSink>>,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            grace: chrono::Duration::days(i64::from(grace_days)),
            archive,
            interval,
        }
    }
}

#[async_trait]
impl Job for CleanupJob {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &JobContext) -> anyhow::Result<()> {
        let cutoff = ctx.started_at - self.grace;
        let purged = rin_db::purge_expired(&self.pool, cutoff)
            .await
            .context("purge of expired coupons failed")?;
        let abandoned = rin_db::count_abandoned(&self.pool).await?;
        tracing::info!(purged, abandoned, %cutoff, "cleanup: expired coupons purged");

        if let Some(archive) = &self.archive {
            let archive = Arc::clone(archive);
            // Fire-and-log; the sync can outlive this cycle.
            tokio::spawn(async move {
                match archive.sync().await {
                    Ok(()) => tracing::info!("cleanup: archive sync complete"),
                    Err(e) => tracing::warn!(error = %e, "cleanup: archive sync failed"),
                }
            });
        }
        Ok(())
    }
}

/// Build both jobs from configuration.
///
/// # Errors
///
/// Fails if an HTTP client cannot be constructed or the built-in source set
/// cannot be registered.
pub fn build_jobs(pool: &SqlitePool, config: &AppConfig) -> anyhow::Result<Vec<Arc<dyn Job>>> {
    let mut registry = SourceRegistry::new();
    register_builtin_sources(&mut registry, &config.generic_source_urls)?;
    tracing::info!(
        sources = ?registry.source_names().collect::<Vec<_>>(),
        "scrape: sources registered"
    );

    let fetcher = HttpFetcher::new(
        config.scraper_request_timeout_secs,
        &config.scraper_user_agent,
        config.scraper_max_retries,
        config.scraper_retry_backoff_base_secs,
    )?;
    let orchestrator = ScrapeOrchestrator::new(
        Arc::new(registry),
        Arc::new(fetcher),
        OrchestratorConfig::from_app_config(config),
    );

    let probe_client =
        rin_scraper::build_http_client(config.validation_timeout_secs, &config.scraper_user_agent)?;
    let validator = Validator::new(
        CheckRegistry::with_builtin_checks(),
        SourceBreaker::new(config.breaker_threshold, config.breaker_cooldown_cycles),
        probe_client,
        ValidatorConfig::from_app_config(config),
    );

    let sink = DiscordWebhookSink::new(&config.discord_webhook_url, config.notify_timeout_secs)
        .context("failed to build Discord webhook client")?;
    let notifier = Notifier::new(Arc::new(sink), config.notify_max_attempts);

    let archive: Option<Arc<dyn ArchiveSink>> = config.archive_remote.as_ref().map(|remote| {
        Arc::new(RcloneArchive::new(
            config.archive_local_path.clone(),
            remote.clone(),
        )) as Arc<dyn ArchiveSink>
    });

    Ok(vec![
        Arc::new(ScrapeCycleJob::new(
            pool.clone(),
            orchestrator,
            validator,
            notifier,
            config.scrape_interval(),
        )),
        Arc::new(CleanupJob::new(
            pool.clone(),
            config.purge_grace_days,
            archive,
            config.cleanup_interval(),
        )),
    ])
}

#[cfg(test)]
#[path = "jobs_test.rs"]
mod tests;
