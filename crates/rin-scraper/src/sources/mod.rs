//! Built-in coupon sources.

pub mod cursor;
pub mod generic;
pub mod github;
pub mod replit;
pub mod student;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Selector};

use crate::error::ScraperError;
use crate::registry::{RegistryError, SourceRegistry};

pub use cursor::CursorScraper;
pub use generic::GenericDealsScraper;
pub use github::GitHubEducationScraper;
pub use replit::ReplitScraper;
pub use student::StudentProgramScraper;

/// Register every built-in source in its canonical order.
///
/// The generic deals scraper is only registered when at least one URL is
/// configured.
///
/// # Errors
///
/// Returns [`RegistryError::DuplicateSource`] if `registry` already holds one
/// of the built-in source names.
pub fn register_builtin_sources(
    registry: &mut SourceRegistry,
    generic_urls: &[String],
) -> Result<(), RegistryError> {
    registry.register(Arc::new(CursorScraper::new()))?;
    registry.register(Arc::new(GitHubEducationScraper::new()))?;
    registry.register(Arc::new(ReplitScraper::new()))?;
    registry.register(Arc::new(StudentProgramScraper::warp()))?;
    registry.register(Arc::new(StudentProgramScraper::tabnine()))?;
    if !generic_urls.is_empty() {
        registry.register(Arc::new(GenericDealsScraper::new(generic_urls.to_vec())))?;
    }
    Ok(())
}

pub(crate) fn selector(css: &str) -> Result<Selector, ScraperError> {
    Selector::parse(css).map_err(|e| ScraperError::Parse {
        context: format!("selector {css}"),
        reason: format!("{e:?}"),
    })
}

/// Whitespace-collapsed text content of an element.
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse an expiry attribute: RFC 3339 timestamp or a bare `YYYY-MM-DD`
/// (treated as the end of that day, UTC).
pub(crate) fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn builtin_sources_register_in_order() {
        let mut registry = SourceRegistry::new();
        register_builtin_sources(&mut registry, &["https://deals.example".to_string()]).unwrap();
        let names: Vec<&str> = registry.source_names().collect();
        assert_eq!(
            names,
            vec!["cursor", "github", "replit", "warp", "tabnine", "generic"]
        );
    }

    #[test]
    fn generic_source_skipped_without_urls() {
        let mut registry = SourceRegistry::new();
        register_builtin_sources(&mut registry, &[]).unwrap();
        assert!(registry.get("generic").is_none());
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn registering_builtins_twice_is_rejected() {
        let mut registry = SourceRegistry::new();
        register_builtin_sources(&mut registry, &[]).unwrap();
        let err = register_builtin_sources(&mut registry, &[]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateSource("cursor".to_string()));
    }

    #[test]
    fn parse_expiry_accepts_date_and_timestamp() {
        assert_eq!(
            parse_expiry("2026-12-31"),
            Some(Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap())
        );
        assert_eq!(
            parse_expiry("2026-06-01T10:00:00+02:00"),
            Some(Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(parse_expiry("soon"), None);
    }
}
