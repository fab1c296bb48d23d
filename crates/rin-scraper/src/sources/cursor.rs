use async_trait::async_trait;
use rin_core::RawCandidate;
use scraper::Html;

use super::{parse_expiry, selector};
use crate::error::ScraperError;
use crate::source::{ScrapeContext, Scraper};

pub const CURSOR_BASE_URL: &str = "https://cursor.sh";

/// Cursor: the student programme page plus any promotion codes listed on the
/// pricing page.
#[derive(Debug, Clone)]
pub struct CursorScraper {
    base_url: String,
}

impl CursorScraper {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(CURSOR_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for CursorScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scraper for CursorScraper {
    fn name(&self) -> &str {
        "Cursor AI"
    }

    fn source(&self) -> &str {
        "cursor"
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Vec<RawCandidate>, ScraperError> {
        let student_url = format!("{}/student", self.base_url);
        let html = ctx.fetch_html(&student_url).await?;
        let mut candidates = parse_student_page(&html, &student_url)?;

        // The pricing page is a bonus; losing it keeps the student offer.
        let pricing_url = format!("{}/pricing", self.base_url);
        match ctx.fetch_html(&pricing_url).await {
            Ok(html) => candidates.extend(parse_pricing_page(&html, &pricing_url)?),
            Err(ScraperError::Cancelled) => return Err(ScraperError::Cancelled),
            Err(e) => {
                tracing::warn!(url = %pricing_url, error = %e, "scrape: cursor pricing page unavailable");
            }
        }

        Ok(candidates)
    }
}

pub(crate) fn parse_student_page(html: &str, url: &str) -> Result<Vec<RawCandidate>, ScraperError> {
    let document = Html::parse_document(html);
    let banner = selector("div.student-discount")?;
    if document.select(&banner).next().is_none() {
        return Ok(Vec::new());
    }

    Ok(vec![RawCandidate {
        name: "Cursor AI Student Plan".to_string(),
        description: "Free Pro features for verified students".to_string(),
        discount_percentage: Some(100.0),
        code: "STUDENT".to_string(),
        url: url.to_string(),
        expiry: None,
    }])
}

/// Each `div.promotion-code` carries its code in `data-code`, and optionally
/// `data-discount` (percent) and `data-expires`.
pub(crate) fn parse_pricing_page(html: &str, url: &str) -> Result<Vec<RawCandidate>, ScraperError> {
    let document = Html::parse_document(html);
    let promo = selector("div.promotion-code")?;

    let candidates = document
        .select(&promo)
        .filter_map(|el| {
            let attrs = el.value();
            let code = attrs.attr("data-code").map(str::trim).filter(|c| !c.is_empty())?;
            let discount = attrs
                .attr("data-discount")
                .and_then(|d| d.trim().parse::<f64>().ok());
            let name = match discount {
                Some(d) => format!("Cursor AI Promotion: {d}% Off"),
                None => "Cursor AI Promotion".to_string(),
            };
            Some(RawCandidate {
                name,
                description: "Limited time promotion for Cursor AI Pro".to_string(),
                discount_percentage: discount,
                code: code.to_string(),
                url: url.to_string(),
                expiry: attrs.attr("data-expires").and_then(parse_expiry),
            })
        })
        .collect();

    Ok(candidates)
}
