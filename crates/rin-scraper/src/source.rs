use std::sync::Arc;

use async_trait::async_trait;
use rin_core::RawCandidate;
use tokio_util::sync::CancellationToken;

use crate::client::HttpFetcher;
use crate::error::ScraperError;

/// Per-cycle context handed to every scraper invocation.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    pub fetcher: Arc<HttpFetcher>,
    pub cancel: CancellationToken,
}

impl ScrapeContext {
    /// Fetch a page through the shared fetcher, honouring the cycle's cancellation.
    ///
    /// # Errors
    ///
    /// Propagates [`HttpFetcher::fetch_html`] errors.
    pub async fn fetch_html(&self, url: &str) -> Result<String, ScraperError> {
        self.fetcher.fetch_html(url, &self.cancel).await
    }
}

/// One coupon source.
///
/// `source()` is the stable key stored on every coupon row and used for
/// registry lookups; `name()` is for humans and logs.
#[async_trait]
pub trait Scraper: Send + Sync {
    fn name(&self) -> &str;

    fn source(&self) -> &str;

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Vec<RawCandidate>, ScraperError>;
}
