use std::collections::HashSet;
use std::sync::Arc;

use rin_core::normalize_source;
use thiserror::Error;

use crate::source::Scraper;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a scraper is already registered for source \"{0}\"")]
    DuplicateSource(String),
}

/// Ordered set of scrapers keyed by normalized source name.
///
/// Iteration follows registration order, which the orchestrator uses as the
/// Store insertion order.
#[derive(Default)]
pub struct SourceRegistry {
    scrapers: Vec<Arc<dyn Scraper>>,
    sources: HashSet<String>,
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scraper.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateSource`] if a scraper with the same
    /// normalized source name is already registered.
    pub fn register(&mut self, scraper: Arc<dyn Scraper>) -> Result<(), RegistryError> {
        let key = normalize_source(scraper.source());
        if !self.sources.insert(key.clone()) {
            return Err(RegistryError::DuplicateSource(key));
        }
        self.scrapers.push(scraper);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Scraper>> {
        self.scrapers.iter()
    }

    #[must_use]
    pub fn get(&self, source: &str) -> Option<&Arc<dyn Scraper>> {
        let key = normalize_source(source);
        self.scrapers
            .iter()
            .find(|s| normalize_source(s.source()) == key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.scrapers.iter().map(|s| s.source())
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.source_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScraperError;
    use crate::source::ScrapeContext;
    use async_trait::async_trait;
    use rin_core::RawCandidate;

    struct Named(&'static str);

    #[async_trait]
    impl Scraper for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn source(&self) -> &str {
            self.0
        }

        async fn scrape(&self, _ctx: &ScrapeContext) -> Result<Vec<RawCandidate>, ScraperError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn preserves_registration_order() {
        let mut registry = SourceRegistry::new();
        for name in ["warp", "cursor", "generic"] {
            registry.register(Arc::new(Named(name))).unwrap();
        }
        let names: Vec<&str> = registry.source_names().collect();
        assert_eq!(names, vec!["warp", "cursor", "generic"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn rejects_duplicate_source_ignoring_case() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(Named("warp"))).unwrap();
        let err = registry.register(Arc::new(Named(" Warp"))).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateSource("warp".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_looks_up_by_normalized_source() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(Named("tabnine"))).unwrap();
        assert!(registry.get("TABNINE").is_some());
        assert!(registry.get("replit").is_none());
    }
}
