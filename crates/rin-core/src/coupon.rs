//! Coupon value types shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dedup::{coupon_hash, normalize_source};

/// A raw, unvalidated coupon record produced by one scraper invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub name: String,
    pub description: String,
    pub discount_percentage: Option<f64>,
    pub code: String,
    pub url: String,
    pub expiry: Option<DateTime<Utc>>,
}

/// A candidate attributed to its source and fingerprinted, ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCoupon {
    pub name: String,
    pub description: String,
    pub discount_percentage: Option<f64>,
    pub code: String,
    pub url: String,
    pub source: String,
    pub expiry: Option<DateTime<Utc>>,
    pub hash: String,
}

impl NewCoupon {
    /// Attach `source` to a scraped candidate and compute its dedup hash.
    ///
    /// Descriptive fields are stored as scraped (trimmed); the source is
    /// stored normalized so every consumer keys on the same slug.
    #[must_use]
    pub fn from_candidate(source: &str, candidate: RawCandidate) -> Self {
        let hash = coupon_hash(source, &candidate.code, &candidate.url);
        Self {
            name: candidate.name.trim().to_string(),
            description: candidate.description.trim().to_string(),
            discount_percentage: candidate.discount_percentage,
            code: candidate.code.trim().to_string(),
            url: candidate.url.trim().to_string(),
            source: normalize_source(source),
            expiry: candidate.expiry,
            hash,
        }
    }
}

/// Payload handed to a messaging sink. Never carries internal error text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponMessage {
    pub name: String,
    pub description: String,
    pub code: String,
    pub discount: Option<f64>,
    pub url: String,
    pub source: String,
    pub expiry: Option<DateTime<Utc>>,
}
