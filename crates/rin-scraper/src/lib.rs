pub mod client;
pub mod error;
pub mod orchestrator;
pub(crate) mod rate_limit;
pub mod registry;
pub mod source;
pub mod sources;

pub use client::{build_http_client, HttpFetcher};
pub use error::ScraperError;
pub use orchestrator::{CycleSummary, OrchestratorConfig, ScrapeOrchestrator, SourceResult};
pub use registry::{RegistryError, SourceRegistry};
pub use source::{ScrapeContext, Scraper};
pub use sources::register_builtin_sources;
