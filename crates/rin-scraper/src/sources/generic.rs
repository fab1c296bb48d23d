use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rin_core::RawCandidate;
use scraper::Html;

use super::parse_expiry;
use crate::error::ScraperError;
use crate::source::{ScrapeContext, Scraper};

/// `code: ABC-123`; the keyword is case-insensitive, the code itself must be
/// upper-case alphanumerics so prose like "code for" is not captured.
static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:\bcode\b)[:\s]+([A-Z0-9][A-Z0-9-]{2,})").expect("valid regex")
});
static DISCOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{1,3})%\s+(?:off|discount)").expect("valid regex"));
static EXPIRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:expires|valid until|ends)[:\s]+(\d{4}-\d{2}-\d{2})").expect("valid regex")
});

/// How far (in bytes of page text) a discount or expiry may sit from a code
/// and still be attributed to it.
const ATTRIBUTION_WINDOW: usize = 200;

/// Pattern-based scraper over a configurable list of deal pages.
///
/// Per-page failures are logged and skipped; the source only fails when
/// every page failed.
#[derive(Debug, Clone)]
pub struct GenericDealsScraper {
    urls: Vec<String>,
}

impl GenericDealsScraper {
    #[must_use]
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

#[async_trait]
impl Scraper for GenericDealsScraper {
    fn name(&self) -> &str {
        "Generic AI Tools"
    }

    fn source(&self) -> &str {
        "generic"
    }

    async fn scrape(&self, ctx: &ScrapeContext) -> Result<Vec<RawCandidate>, ScraperError> {
        let mut candidates = Vec::new();
        let mut last_err = None;
        let mut fetched = 0usize;

        for url in &self.urls {
            match ctx.fetch_html(url).await {
                Ok(html) => {
                    fetched += 1;
                    let found = parse_generic_page(&html, url);
                    tracing::debug!(url = %url, count = found.len(), "scrape: generic page parsed");
                    candidates.extend(found);
                }
                Err(ScraperError::Cancelled) => return Err(ScraperError::Cancelled),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "scrape: generic page failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(err) if fetched == 0 => Err(err),
            _ => Ok(candidates),
        }
    }
}

/// Extract every distinct code on a page, attributing the nearest discount
/// and expiry mention within [`ATTRIBUTION_WINDOW`].
pub(crate) fn parse_generic_page(html: &str, url: &str) -> Vec<RawCandidate> {
    let document = Html::parse_document(html);
    let text = document
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");

    let discounts: Vec<(usize, f64)> = DISCOUNT_RE
        .captures_iter(&text)
        .filter_map(|c| {
            let m = c.get(1)?;
            let pct = m.as_str().parse::<f64>().ok().filter(|p| *p > 0.0 && *p <= 100.0)?;
            Some((m.start(), pct))
        })
        .collect();
    let expiries: Vec<(usize, String)> = EXPIRY_RE
        .captures_iter(&text)
        .filter_map(|c| c.get(1).map(|m| (m.start(), m.as_str().to_string())))
        .collect();

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for caps in CODE_RE.captures_iter(&text) {
        let Some(code_match) = caps.get(1) else {
            continue;
        };
        let code = code_match.as_str().trim_end_matches('-').to_string();
        if !seen.insert(code.clone()) {
            continue;
        }

        let at = code_match.start();
        let discount = nearest(&discounts, at).copied();
        let expiry = nearest(&expiries, at).and_then(|raw| parse_expiry(raw));

        let (name, description) = match discount {
            Some(d) => (
                format!("AI Tool Discount: {d}% Off"),
                format!("Use code {code} for {d}% off"),
            ),
            None => (
                "AI Tool Promo Code".to_string(),
                format!("Use code {code}"),
            ),
        };
        candidates.push(RawCandidate {
            name,
            description,
            discount_percentage: discount,
            code,
            url: url.to_string(),
            expiry,
        });
    }
    candidates
}

fn nearest<T>(positions: &[(usize, T)], at: usize) -> Option<&T> {
    positions
        .iter()
        .map(|(pos, value)| (pos.abs_diff(at), value))
        .filter(|(distance, _)| *distance <= ATTRIBUTION_WINDOW)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, value)| value)
}
