use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a pure
/// `HashMap` lookup.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_nonzero = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let value = parse_u64(var, default)?;
        if value == 0 {
            return Err(invalid(var, "must be at least 1".to_string()));
        }
        Ok(value)
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got \"{other}\""))),
        }
    };

    let env = parse_environment(&or_default("RIN_ENV", "development"))?;
    let database_url = or_default("DATABASE_URL", "sqlite://data/rin.db?mode=rwc");
    let log_level = or_default("RIN_LOG_LEVEL", "info");
    let bind_addr = parse_addr("RIN_BIND_ADDR", "0.0.0.0:8080")?;
    let api_enabled = parse_bool("RIN_API_ENABLED", "true")?;
    let db_max_connections = parse_u32("RIN_DB_MAX_CONNECTIONS", "5")?;
    let db_acquire_timeout_secs = parse_u64("RIN_DB_ACQUIRE_TIMEOUT_SECS", "30")?;

    let scrape_interval_mins = parse_nonzero("RIN_SCRAPE_INTERVAL_MINS", "60")?;
    let cleanup_interval_hours = parse_nonzero("RIN_CLEANUP_INTERVAL_HOURS", "24")?;
    let cycle_ceiling_multiplier = parse_u32("RIN_CYCLE_CEILING_MULTIPLIER", "2")?.max(1);
    let shutdown_grace_secs = parse_u64("RIN_SHUTDOWN_GRACE_SECS", "30")?;

    let scraper_user_agent = or_default("RIN_SCRAPER_USER_AGENT", "RinKokonoe Coupon Bot/1.0");
    let scraper_request_timeout_secs = parse_nonzero("RIN_SCRAPER_TIMEOUT_SECS", "30")?;
    let scraper_source_timeout_secs = parse_nonzero("RIN_SCRAPER_SOURCE_TIMEOUT_SECS", "120")?;
    let scraper_max_concurrent = parse_usize("RIN_SCRAPER_MAX_CONCURRENT", "10")?.max(1);
    let scraper_max_retries = parse_u32("RIN_SCRAPER_MAX_RETRIES", "2")?;
    let scraper_retry_backoff_base_secs = parse_u64("RIN_SCRAPER_RETRY_BACKOFF_BASE_SECS", "2")?;
    let generic_source_urls = parse_url_list(&or_default("RIN_GENERIC_SOURCE_URLS", ""));

    let validation_timeout_secs = parse_nonzero("RIN_VALIDATION_TIMEOUT_SECS", "30")?;
    let validation_max_concurrent = parse_usize("RIN_VALIDATION_MAX_CONCURRENT", "10")?.max(1);
    let validation_staleness_hours = parse_u64("RIN_VALIDATION_STALENESS_HOURS", "24")?;
    let validation_unknown_threshold = parse_u32("RIN_VALIDATION_UNKNOWN_THRESHOLD", "3")?.max(1);
    let breaker_threshold = parse_u32("RIN_BREAKER_THRESHOLD", "5")?.max(1);
    let breaker_cooldown_cycles = parse_u32("RIN_BREAKER_COOLDOWN_CYCLES", "2")?;

    let discord_webhook_url = require("RIN_DISCORD_WEBHOOK_URL")?;
    let notify_max_attempts = parse_u32("RIN_NOTIFY_MAX_ATTEMPTS", "5")?.max(1);
    let notify_timeout_secs = parse_nonzero("RIN_NOTIFY_TIMEOUT_SECS", "15")?;

    let purge_grace_days = parse_u32("RIN_PURGE_GRACE_DAYS", "7")?;
    let archive_remote = lookup("RIN_ARCHIVE_REMOTE")
        .ok()
        .filter(|v| !v.trim().is_empty());
    let archive_local_path = PathBuf::from(or_default("RIN_ARCHIVE_LOCAL_PATH", "data"));

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        bind_addr,
        api_enabled,
        db_max_connections,
        db_acquire_timeout_secs,
        scrape_interval_mins,
        cleanup_interval_hours,
        cycle_ceiling_multiplier,
        shutdown_grace_secs,
        scraper_user_agent,
        scraper_request_timeout_secs,
        scraper_source_timeout_secs,
        scraper_max_concurrent,
        scraper_max_retries,
        scraper_retry_backoff_base_secs,
        generic_source_urls,
        validation_timeout_secs,
        validation_max_concurrent,
        validation_staleness_hours,
        validation_unknown_threshold,
        breaker_threshold,
        breaker_cooldown_cycles,
        discord_webhook_url,
        notify_max_attempts,
        notify_timeout_secs,
        purge_grace_days,
        archive_remote,
        archive_local_path,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "RIN_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

/// Split a comma-separated URL list, dropping blanks.
fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
