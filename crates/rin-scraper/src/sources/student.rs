use async_trait::async_trait;
use rin_core::RawCandidate;

use crate::error::ScraperError;
use crate::source::{ScrapeContext, Scraper};

/// A student programme whose existence is the offer: a reachable landing
/// page yields one fixed candidate.
#[derive(Debug, Clone)]
pub struct StudentProgramScraper {
    source: &'static str,
    name: &'static str,
    page_url: String,
    offer_name: &'static str,
    description: &'static str,
    code: &'static str,
}

impl StudentProgramScraper {
    #[must_use]
    pub fn warp() -> Self {
        Self {
            source: "warp",
            name: "Warp",
            page_url: "https://www.warp.dev/students".to_string(),
            offer_name: "Warp Terminal Student Plan",
            description: "Free Warp Premium subscription for verified students",
            code: "AUTO-APPLIED",
        }
    }

    #[must_use]
    pub fn tabnine() -> Self {
        Self {
            source: "tabnine",
            name: "Tabnine",
            page_url: "https://www.tabnine.com/students".to_string(),
            offer_name: "Tabnine Pro Student Plan",
            description: "Free Tabnine Pro for verified students",
            code: "STUDENT",
        }
    }

    #[must_use]
    pub fn with_page_url(mut self, page_url: &str) -> Self {
        self.page_url = page_url.to_string();
        self
    }
}

#[async_trait]
impl Scraper for StudentProgramScraper {
    fn name(&self) -> &str {
        self.name
    }

    fn source(&self) -> &str {
        self.source
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Vec<RawCandidate>, ScraperError> {
        ctx.fetch_html(&self.page_url).await?;
        Ok(vec![RawCandidate {
            name: self.offer_name.to_string(),
            description: self.description.to_string(),
            discount_percentage: Some(100.0),
            code: self.code.to_string(),
            url: self.page_url.clone(),
            expiry: None,
        }])
    }
}
