use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rin_core::RawCandidate;
use scraper::Html;

use super::{element_text, selector};
use crate::error::ScraperError;
use crate::source::{ScrapeContext, Scraper};

pub const GITHUB_EDUCATION_BASE_URL: &str = "https://education.github.com";

/// Offer name prefix; the validity check strips it to find the offer title.
pub const GITHUB_OFFER_PREFIX: &str = "GitHub Student Pack: ";

static AI_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bai\b").expect("valid regex"));

/// AI-tool offers from the GitHub Student Developer Pack.
#[derive(Debug, Clone)]
pub struct GitHubEducationScraper {
    base_url: String,
}

impl GitHubEducationScraper {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(GITHUB_EDUCATION_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for GitHubEducationScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scraper for GitHubEducationScraper {
    fn name(&self) -> &str {
        "GitHub Education"
    }

    fn source(&self) -> &str {
        "github"
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Vec<RawCandidate>, ScraperError> {
        let pack_url = format!("{}/pack", self.base_url);
        let html = ctx.fetch_html(&pack_url).await?;
        parse_pack_page(&html, &pack_url)
    }
}

/// Every offer becomes its own candidate, distinguished by a title anchor on
/// the pack URL. Only offers whose title mentions AI are kept.
pub(crate) fn parse_pack_page(html: &str, pack_url: &str) -> Result<Vec<RawCandidate>, ScraperError> {
    let document = Html::parse_document(html);
    let offer_sel = selector("div.d-flex.flex-wrap.gutter")?;
    let title_sel = selector("h3")?;
    let desc_sel = selector("p")?;

    let mut candidates = Vec::new();
    for offer in document.select(&offer_sel) {
        let Some(title) = offer
            .select(&title_sel)
            .next()
            .map(|e| element_text(&e))
            .filter(|t| AI_WORD_RE.is_match(t))
        else {
            continue;
        };
        let description = offer
            .select(&desc_sel)
            .next()
            .map(|e| element_text(&e))
            .unwrap_or_default();

        candidates.push(RawCandidate {
            name: format!("{GITHUB_OFFER_PREFIX}{title}"),
            description,
            discount_percentage: None,
            code: "GITHUB-STUDENT".to_string(),
            url: format!("{pack_url}#{}", anchor_slug(&title)),
            expiry: None,
        });
    }
    Ok(candidates)
}

fn anchor_slug(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
