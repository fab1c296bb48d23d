use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Process-wide configuration, built once at startup and handed to each
/// component constructor.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub bind_addr: SocketAddr,
    pub api_enabled: bool,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub scrape_interval_mins: u64,
    pub cleanup_interval_hours: u64,
    /// Hard per-cycle ceiling, expressed as a multiple of the job's interval.
    pub cycle_ceiling_multiplier: u32,
    pub shutdown_grace_secs: u64,

    pub scraper_user_agent: String,
    pub scraper_request_timeout_secs: u64,
    /// Upper bound on one source's whole scrape, retries included.
    pub scraper_source_timeout_secs: u64,
    pub scraper_max_concurrent: usize,
    pub scraper_max_retries: u32,
    pub scraper_retry_backoff_base_secs: u64,
    pub generic_source_urls: Vec<String>,

    pub validation_timeout_secs: u64,
    pub validation_max_concurrent: usize,
    pub validation_staleness_hours: u64,
    pub validation_unknown_threshold: u32,
    pub breaker_threshold: u32,
    pub breaker_cooldown_cycles: u32,

    pub discord_webhook_url: String,
    pub notify_max_attempts: u32,
    pub notify_timeout_secs: u64,

    pub purge_grace_days: u32,
    pub archive_remote: Option<String>,
    pub archive_local_path: PathBuf,
}

impl AppConfig {
    #[must_use]
    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_mins.saturating_mul(60))
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_hours.saturating_mul(3600))
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("bind_addr", &self.bind_addr)
            .field("api_enabled", &self.api_enabled)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("scrape_interval_mins", &self.scrape_interval_mins)
            .field("cleanup_interval_hours", &self.cleanup_interval_hours)
            .field("cycle_ceiling_multiplier", &self.cycle_ceiling_multiplier)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .field("scraper_user_agent", &self.scraper_user_agent)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field(
                "scraper_source_timeout_secs",
                &self.scraper_source_timeout_secs,
            )
            .field("scraper_max_concurrent", &self.scraper_max_concurrent)
            .field("scraper_max_retries", &self.scraper_max_retries)
            .field(
                "scraper_retry_backoff_base_secs",
                &self.scraper_retry_backoff_base_secs,
            )
            .field("generic_source_urls", &self.generic_source_urls)
            .field("validation_timeout_secs", &self.validation_timeout_secs)
            .field("validation_max_concurrent", &self.validation_max_concurrent)
            .field(
                "validation_staleness_hours",
                &self.validation_staleness_hours,
            )
            .field(
                "validation_unknown_threshold",
                &self.validation_unknown_threshold,
            )
            .field("breaker_threshold", &self.breaker_threshold)
            .field("breaker_cooldown_cycles", &self.breaker_cooldown_cycles)
            .field("discord_webhook_url", &"[redacted]")
            .field("notify_max_attempts", &self.notify_max_attempts)
            .field("notify_timeout_secs", &self.notify_timeout_secs)
            .field("purge_grace_days", &self.purge_grace_days)
            .field("archive_remote", &self.archive_remote)
            .field("archive_local_path", &self.archive_local_path)
            .finish()
    }
}
