use async_trait::async_trait;
use rin_core::RawCandidate;
use scraper::Html;

use super::selector;
use crate::error::ScraperError;
use crate::source::{ScrapeContext, Scraper};

pub const REPLIT_BASE_URL: &str = "https://replit.com";

#[derive(Debug, Clone)]
pub struct ReplitScraper {
    base_url: String,
}

impl ReplitScraper {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(REPLIT_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for ReplitScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scraper for ReplitScraper {
    fn name(&self) -> &str {
        "Replit"
    }

    fn source(&self) -> &str {
        "replit"
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Vec<RawCandidate>, ScraperError> {
        let url = format!("{}/site/teams-for-education", self.base_url);
        let html = ctx.fetch_html(&url).await?;
        parse_education_page(&html, &url)
    }
}

pub(crate) fn parse_education_page(
    html: &str,
    url: &str,
) -> Result<Vec<RawCandidate>, ScraperError> {
    let document = Html::parse_document(html);
    let offer = selector("div.education-discount")?;
    if document.select(&offer).next().is_none() {
        return Ok(Vec::new());
    }

    Ok(vec![RawCandidate {
        name: "Replit Teams for Education".to_string(),
        description: "Special pricing for educational institutions".to_string(),
        discount_percentage: Some(50.0),
        code: "EDUCATION".to_string(),
        url: url.to_string(),
        expiry: None,
    }])
}
