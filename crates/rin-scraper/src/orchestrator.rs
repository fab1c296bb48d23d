//! Fan-out over every registered source and persistence of the results.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rin_core::{normalize_source, NewCoupon, RawCandidate};
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::client::HttpFetcher;
use crate::error::ScraperError;
use crate::registry::SourceRegistry;
use crate::source::{ScrapeContext, Scraper};

/// What happened to one source during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceResult {
    Candidates {
        count: usize,
        inserted: usize,
        enriched: usize,
    },
    Failed(String),
}

/// Per-source results of one scrape cycle, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub sources: Vec<(String, SourceResult)>,
}

impl CycleSummary {
    #[must_use]
    pub fn get(&self, source: &str) -> Option<&SourceResult> {
        self.sources
            .iter()
            .find(|(name, _)| name == source)
            .map(|(_, result)| result)
    }

    #[must_use]
    pub fn inserted(&self) -> usize {
        self.sources
            .iter()
            .map(|(_, r)| match r {
                SourceResult::Candidates { inserted, .. } => *inserted,
                SourceResult::Failed(_) => 0,
            })
            .sum()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.sources
            .iter()
            .filter(|(_, r)| matches!(r, SourceResult::Failed(_)))
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub max_concurrent: usize,
    pub source_timeout: Duration,
}

impl OrchestratorConfig {
    #[must_use]
    pub fn from_app_config(config: &rin_core::AppConfig) -> Self {
        Self {
            max_concurrent: config.scraper_max_concurrent.max(1),
            source_timeout: Duration::from_secs(config.scraper_source_timeout_secs),
        }
    }
}

/// Runs every registered scraper and persists what they find.
pub struct ScrapeOrchestrator {
    registry: Arc<SourceRegistry>,
    fetcher: Arc<HttpFetcher>,
    config: OrchestratorConfig,
}

impl ScrapeOrchestrator {
    #[must_use]
    pub fn new(
        registry: Arc<SourceRegistry>,
        fetcher: Arc<HttpFetcher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            fetcher,
            config,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Run one scrape cycle.
    ///
    /// Every scraper runs in its own task, at most `max_concurrent` at a
    /// time, each under `source_timeout`. A scraper that errors, times out,
    /// or panics is recorded as failed without affecting the others.
    /// Candidates are then written to the Store source by source in
    /// registration order, so ids (and therefore notification order among
    /// same-timestamp rows) are stable across runs.
    pub async fn run_cycle(&self, pool: &SqlitePool, cancel: &CancellationToken) -> CycleSummary {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let handles: Vec<(String, JoinHandle<Result<Vec<RawCandidate>, ScraperError>>)> = self
            .registry
            .iter()
            .map(|scraper| {
                let source = normalize_source(scraper.source());
                let ctx = ScrapeContext {
                    fetcher: Arc::clone(&self.fetcher),
                    cancel: cancel.clone(),
                };
                let handle = tokio::spawn(scrape_one(
                    Arc::clone(scraper),
                    ctx,
                    Arc::clone(&permits),
                    self.config.source_timeout,
                ));
                (source, handle)
            })
            .collect();

        let mut summary = CycleSummary::default();
        for (source, handle) in handles {
            let result = match join_outcome(&source, handle.await) {
                Ok(candidates) => persist(pool, &source, candidates).await,
                Err(reason) => {
                    tracing::warn!(source = %source, error = %reason, "scrape: source failed");
                    SourceResult::Failed(reason)
                }
            };
            summary.sources.push((source, result));
        }

        tracing::info!(
            sources = summary.sources.len(),
            failed = summary.failed(),
            inserted = summary.inserted(),
            "scrape: cycle complete"
        );
        summary
    }
}

/// Body of one per-source task. The timeout starts once a permit is held.
async fn scrape_one(
    scraper: Arc<dyn Scraper>,
    ctx: ScrapeContext,
    permits: Arc<Semaphore>,
    source_timeout: Duration,
) -> Result<Vec<RawCandidate>, ScraperError> {
    let cancel = ctx.cancel.clone();
    let _permit = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ScraperError::Cancelled),
        permit = permits.acquire_owned() => permit.map_err(|_| ScraperError::Cancelled)?,
    };
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ScraperError::Cancelled),
        res = tokio::time::timeout(source_timeout, scraper.scrape(&ctx)) => {
            res.unwrap_or_else(|_| {
                Err(ScraperError::Timeout {
                    source_name: scraper.source().to_string(),
                    secs: source_timeout.as_secs(),
                })
            })
        }
    }
}

/// Flatten a task's join result; a panic is contained to its own source.
fn join_outcome(
    source: &str,
    joined: Result<Result<Vec<RawCandidate>, ScraperError>, JoinError>,
) -> Result<Vec<RawCandidate>, String> {
    match joined {
        Ok(Ok(candidates)) => {
            tracing::debug!(source = %source, count = candidates.len(), "scrape: source returned");
            Ok(candidates)
        }
        Ok(Err(e)) => Err(e.to_string()),
        Err(join_err) if join_err.is_panic() => Err("scraper panicked".to_string()),
        Err(join_err) => Err(format!("scraper task aborted: {join_err}")),
    }
}

async fn persist(pool: &SqlitePool, source: &str, candidates: Vec<RawCandidate>) -> SourceResult {
    let count = candidates.len();
    let batch: Vec<NewCoupon> = candidates
        .into_iter()
        .map(|c| NewCoupon::from_candidate(source, c))
        .collect();

    match rin_db::insert_coupons(pool, &batch, Utc::now()).await {
        Ok(stats) => {
            tracing::info!(
                source = %source,
                candidates = count,
                inserted = stats.inserted,
                enriched = stats.enriched,
                "scrape: source persisted"
            );
            SourceResult::Candidates {
                count,
                inserted: stats.inserted,
                enriched: stats.enriched,
            }
        }
        Err(e) => {
            tracing::error!(source = %source, error = %e, "scrape: failed to persist candidates");
            SourceResult::Failed(format!("store: {e}"))
        }
    }
}
