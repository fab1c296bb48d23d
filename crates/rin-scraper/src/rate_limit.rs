//! Retry utilities for scraper page fetches.
//!
//! Transient failures (HTTP 429, 5xx, network errors) are retried with
//! exponential backoff. Everything else, including 404 and other 4xx
//! responses, is returned immediately.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ScraperError;

/// Whether `err` is worth another attempt after a pause.
///
/// Retriable errors:
/// - [`ScraperError::RateLimited`]: HTTP 429; the server has asked us to back off.
/// - [`ScraperError::Http`]: network-level failure (connection reset, timeout, etc.).
/// - [`ScraperError::UnexpectedStatus`] with a 5xx status.
fn is_retriable(err: &ScraperError) -> bool {
    matches!(
        err,
        ScraperError::RateLimited { .. } | ScraperError::Http(_)
    ) || err.is_server_error()
}

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// On a retriable error the function sleeps for `backoff_base_secs * 2^attempt`
/// seconds and tries again, up to `max_retries` additional attempts after the
/// first try. A rate-limited response waits at least its `Retry-After`.
///
/// The sleep is abandoned as soon as `cancel` fires, in which case
/// [`ScraperError::Cancelled`] is returned.
///
/// With `backoff_base_secs = 2` the waits are 2 s, 4 s, 8 s, ...
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut attempt = 0u32;

    loop {
        let last_err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retriable(&err) || attempt >= max_retries => return Err(err),
            Err(err) => err,
        };

        let mut delay_secs = backoff_base_secs.saturating_mul(1u64 << attempt.min(62));
        if let ScraperError::RateLimited {
            retry_after_secs, ..
        } = &last_err
        {
            delay_secs = delay_secs.max(*retry_after_secs);
        }
        tracing::warn!(
            attempt,
            max_retries,
            delay_secs,
            error = %last_err,
            "scrape: transient fetch error, retrying after backoff"
        );

        tokio::select! {
            () = cancel.cancelled() => return Err(ScraperError::Cancelled),
            () = tokio::time::sleep(Duration::from_secs(delay_secs)) => {}
        }
        attempt += 1;
    }
}
