pub mod coupons;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

pub use coupons::{
    abandon_notification, count_abandoned, get_coupon, insert_coupon, insert_coupons,
    list_due_for_validation, list_pending_notifications, list_published_coupons, mark_posted,
    purge_expired, record_delivery_failure, record_inconclusive_validation,
    record_validation_result, CouponRow, DeliveryFailure, InconclusiveValidation, InsertOutcome,
    InsertSummary,
};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
const BUSY_TIMEOUT_SECS: u64 = 5;

// Path relative to crates/rin-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &rin_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections.max(1),
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("failed to prepare database directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a SQLite pool using an explicit URL and config.
///
/// The database file is created if missing. WAL journaling lets the
/// validator's concurrent row writes proceed alongside readers.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the URL is malformed or the connection
/// cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Create the parent directory of a file-backed SQLite URL if it is missing.
///
/// In-memory URLs are ignored.
///
/// # Errors
///
/// Returns [`DbError::Directory`] if the directory cannot be created.
pub fn ensure_database_dir(database_url: &str) -> Result<(), DbError> {
    let Some(path) = sqlite_file_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = Path::new(path).parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|source| DbError::Directory {
        path: parent.display().to_string(),
        source,
    })?;
    tracing::info!(path = %parent.display(), "created database directory");
    Ok(())
}

/// Extract the filesystem path from a `sqlite:` URL, or `None` for in-memory databases.
fn sqlite_file_path(database_url: &str) -> Option<&str> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Some(path)
}

/// Run all pending migrations against the pool.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn health_check(pool: &SqlitePool) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}
