use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {domain} (retry after {retry_after_secs}s)")]
    RateLimited {
        domain: String,
        retry_after_secs: u64,
    },

    #[error("page not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("failed to parse {context}: {reason}")]
    Parse { context: String, reason: String },

    #[error("scrape of {source_name} timed out after {secs}s")]
    Timeout { source_name: String, secs: u64 },

    #[error("scrape cancelled")]
    Cancelled,
}

impl ScraperError {
    /// Server-side failures that may clear up on their own.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::UnexpectedStatus { status, .. } if *status >= 500)
    }
}
