use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use rin_core::normalize_source;
use rin_db::CouponRow;

use crate::probe::{GenericProbe, MentionCheck, StudentPageCheck};

/// Result of one liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Valid,
    Invalid,
    /// Inconclusive: network error, timeout, or a server-side failure.
    Unknown,
}

/// A liveness check for coupons from one source.
#[async_trait]
pub trait ValidityCheck: Send + Sync {
    async fn check(&self, coupon: &CouponRow, client: &Client) -> ProbeOutcome;
}

/// Per-source checks with a generic fallback.
pub struct CheckRegistry {
    by_source: HashMap<String, Arc<dyn ValidityCheck>>,
    fallback: Arc<dyn ValidityCheck>,
}

impl CheckRegistry {
    /// Empty registry; every source uses the generic probe.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_source: HashMap::new(),
            fallback: Arc::new(GenericProbe),
        }
    }

    /// Checks for the built-in sources. Cursor has no dedicated check and
    /// goes through the generic probe.
    #[must_use]
    pub fn with_builtin_checks() -> Self {
        let mut registry = Self::new();
        let student: Arc<dyn ValidityCheck> = Arc::new(StudentPageCheck);
        for source in ["replit", "warp", "tabnine"] {
            registry.register(source, Arc::clone(&student));
        }
        registry.register("github", Arc::new(MentionCheck::offer_title()));
        registry.register("generic", Arc::new(MentionCheck::code()));
        registry
    }

    /// Register (or replace) the check for `source`.
    pub fn register(&mut self, source: &str, check: Arc<dyn ValidityCheck>) {
        self.by_source.insert(normalize_source(source), check);
    }

    #[must_use]
    pub fn for_source(&self, source: &str) -> Arc<dyn ValidityCheck> {
        self.by_source
            .get(&normalize_source(source))
            .map_or_else(|| Arc::clone(&self.fallback), Arc::clone)
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::new()
    }
}
