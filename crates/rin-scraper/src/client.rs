use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::error::ScraperError;
use crate::rate_limit::retry_with_backoff;

/// Shared HTTP fetcher handed to every scraper through the cycle context.
///
/// Wraps a single `reqwest::Client` (connection pool, timeout, `User-Agent`)
/// and applies the retry policy to every page fetch.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    backoff_base_secs: u64,
}

/// Builds the `reqwest::Client` used for outbound scraping traffic.
///
/// # Errors
///
/// Returns [`ScraperError::Http`] if the client cannot be constructed
/// (e.g., invalid TLS config).
pub fn build_http_client(timeout_secs: u64, user_agent: &str) -> Result<Client, ScraperError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

impl HttpFetcher {
    /// Creates a fetcher with configured timeout, `User-Agent`, and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying client cannot be built.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_secs: u64,
    ) -> Result<Self, ScraperError> {
        Ok(Self::with_client(
            build_http_client(timeout_secs, user_agent)?,
            max_retries,
            backoff_base_secs,
        ))
    }

    #[must_use]
    pub fn with_client(client: Client, max_retries: u32, backoff_base_secs: u64) -> Self {
        Self {
            client,
            max_retries,
            backoff_base_secs,
        }
    }

    /// Fetches `url` and returns the response body as text.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::RateLimited`]: HTTP 429 after all retries.
    /// - [`ScraperError::NotFound`]: HTTP 404 (not retried).
    /// - [`ScraperError::UnexpectedStatus`]: any other non-2xx status.
    /// - [`ScraperError::Http`]: network or TLS failure after all retries.
    /// - [`ScraperError::Cancelled`]: `cancel` fired during a backoff wait.
    pub async fn fetch_html(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ScraperError> {
        retry_with_backoff(self.max_retries, self.backoff_base_secs, cancel, || async {
            let response = self.client.get(url).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(ScraperError::RateLimited {
                    domain: extract_domain(url),
                    retry_after_secs,
                });
            }

            if status == StatusCode::NOT_FOUND {
                return Err(ScraperError::NotFound {
                    url: url.to_owned(),
                });
            }

            if !status.is_success() {
                return Err(ScraperError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: url.to_owned(),
                });
            }

            Ok(response.text().await?)
        })
        .await
    }
}

/// Extracts the host from a URL for log and error context.
pub(crate) fn extract_domain(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(5, "rin-test/0.1", 1, 0).unwrap()
    }

    #[test]
    fn extract_domain_returns_host() {
        assert_eq!(
            extract_domain("https://www.warp.dev/students"),
            "www.warp.dev"
        );
        assert_eq!(extract_domain("not a url"), "not a url");
    }

    #[tokio::test]
    async fn fetch_html_returns_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deals"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hi</p>"))
            .mount(&server)
            .await;

        let body = fetcher()
            .fetch_html(&format!("{}/deals", server.uri()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(body, "<p>hi</p>");
    }

    #[tokio::test]
    async fn fetch_html_maps_404_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch_html(&format!("{}/gone", server.uri()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScraperError::NotFound { .. }));
    }

    #[tokio::test]
    async fn fetch_html_retries_rate_limit_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(2)
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch_html(&format!("{}/busy", server.uri()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScraperError::RateLimited {
                retry_after_secs: 0,
                ..
            }
        ));
    }
}
