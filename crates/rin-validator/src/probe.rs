//! Built-in liveness checks.
//!
//! All checks share the same status classification: 2xx is a live page,
//! 429 and 5xx are inconclusive, every other status means the page is gone.
//! Transport errors (DNS, connect, timeout) are inconclusive.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rin_db::CouponRow;

use crate::check::{ProbeOutcome, ValidityCheck};

/// Phrases that mark a promotion page as over, matched case-insensitively.
const EXPIRED_MARKERS: &[&str] = &[
    "expired",
    "no longer available",
    "offer has ended",
    "promotion has ended",
    "invalid code",
];

/// Prefix added to GitHub pack offer names at scrape time.
const GITHUB_OFFER_PREFIX: &str = "GitHub Student Pack: ";

enum Page {
    Live(String),
    Gone,
    Inconclusive,
}

async fn fetch_page(client: &Client, url: &str, read_body: bool) -> Page {
    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "validate: probe transport error");
            return Page::Inconclusive;
        }
    };

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Page::Inconclusive;
    }
    if !status.is_success() {
        return Page::Gone;
    }
    if !read_body {
        return Page::Live(String::new());
    }
    match response.text().await {
        Ok(body) => Page::Live(body),
        Err(_) => Page::Inconclusive,
    }
}

fn has_expired_marker(body: &str) -> bool {
    let lower = body.to_lowercase();
    EXPIRED_MARKERS.iter().any(|m| lower.contains(m))
}

/// Default check: the coupon page must answer 2xx and carry no expired marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericProbe;

#[async_trait]
impl ValidityCheck for GenericProbe {
    async fn check(&self, coupon: &CouponRow, client: &Client) -> ProbeOutcome {
        match fetch_page(client, &coupon.url, true).await {
            Page::Live(body) if has_expired_marker(&body) => ProbeOutcome::Invalid,
            Page::Live(_) => ProbeOutcome::Valid,
            Page::Gone => ProbeOutcome::Invalid,
            Page::Inconclusive => ProbeOutcome::Unknown,
        }
    }
}

/// Student programme pages: reachability is the whole offer.
#[derive(Debug, Clone, Copy, Default)]
pub struct StudentPageCheck;

#[async_trait]
impl ValidityCheck for StudentPageCheck {
    async fn check(&self, coupon: &CouponRow, client: &Client) -> ProbeOutcome {
        match fetch_page(client, &coupon.url, false).await {
            Page::Live(_) => ProbeOutcome::Valid,
            Page::Gone => ProbeOutcome::Invalid,
            Page::Inconclusive => ProbeOutcome::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mention {
    Code,
    OfferTitle,
}

/// The page must still mention the coupon, either its code or its offer
/// title (the coupon name without the pack prefix).
#[derive(Debug, Clone, Copy)]
pub struct MentionCheck {
    mention: Mention,
}

impl MentionCheck {
    #[must_use]
    pub fn code() -> Self {
        Self {
            mention: Mention::Code,
        }
    }

    #[must_use]
    pub fn offer_title() -> Self {
        Self {
            mention: Mention::OfferTitle,
        }
    }

    fn needle(self, coupon: &CouponRow) -> String {
        let raw = match self.mention {
            Mention::Code => coupon.code.as_str(),
            Mention::OfferTitle => coupon
                .name
                .strip_prefix(GITHUB_OFFER_PREFIX)
                .unwrap_or(&coupon.name),
        };
        raw.trim().to_lowercase()
    }
}

#[async_trait]
impl ValidityCheck for MentionCheck {
    async fn check(&self, coupon: &CouponRow, client: &Client) -> ProbeOutcome {
        let needle = self.needle(coupon);
        match fetch_page(client, &coupon.url, true).await {
            Page::Live(body) => {
                let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
                if collapsed.to_lowercase().contains(&needle) {
                    ProbeOutcome::Valid
                } else {
                    ProbeOutcome::Invalid
                }
            }
            Page::Gone => ProbeOutcome::Invalid,
            Page::Inconclusive => ProbeOutcome::Unknown,
        }
    }
}

#[cfg(test)]
#[path = "probe_test.rs"]
mod tests;
