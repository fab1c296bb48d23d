//! Database operations for the `coupons` table.
//!
//! This module is the only writer of coupon lifecycle state. Every operation
//! is a single statement or a single short transaction; nothing holds a
//! connection across network I/O.

use chrono::{DateTime, Utc};
use rin_core::{CouponMessage, NewCoupon};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::DbError;

const COUPON_COLUMNS: &str = "id, name, description, discount_percentage, code, url, source, \
     expiry, created_at, validated_at, is_valid, is_posted, \
     consecutive_unknowns, delivery_failures, abandoned_at, hash";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `coupons` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CouponRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub discount_percentage: Option<f64>,
    pub code: String,
    pub url: String,
    pub source: String,
    pub expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// `NULL` until the first validation attempt.
    pub validated_at: Option<DateTime<Utc>>,
    pub is_valid: bool,
    pub is_posted: bool,
    pub consecutive_unknowns: i64,
    pub delivery_failures: i64,
    pub abandoned_at: Option<DateTime<Utc>>,
    pub hash: String,
}

impl CouponRow {
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.abandoned_at.is_some()
    }

    /// Build the sink payload for this coupon.
    #[must_use]
    pub fn message(&self) -> CouponMessage {
        CouponMessage {
            name: self.name.clone(),
            description: self.description.clone(),
            code: self.code.clone(),
            discount: self.discount_percentage,
            url: self.url.clone(),
            source: self.source.clone(),
            expiry: self.expiry,
        }
    }
}

/// Result of inserting one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New hash; a row was created with the given id.
    Inserted(i64),
    /// Known hash; at least one previously-null field was filled in.
    Enriched,
    /// Known hash; nothing to change.
    Unchanged,
}

/// Aggregate of a batch insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    pub enriched: usize,
    pub unchanged: usize,
}

impl InsertSummary {
    fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted(_) => self.inserted += 1,
            InsertOutcome::Enriched => self.enriched += 1,
            InsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// State after an inconclusive validation probe was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct InconclusiveValidation {
    pub consecutive_unknowns: i64,
    pub is_valid: bool,
}

/// State after a failed delivery was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct DeliveryFailure {
    pub delivery_failures: i64,
    pub abandoned: bool,
}

// ---------------------------------------------------------------------------
// Insert / dedup
// ---------------------------------------------------------------------------

/// Inserts a coupon unless its hash already exists.
///
/// On a known hash the stored row is only enriched: `discount_percentage`
/// and `expiry` are filled when currently `NULL` and the candidate supplies
/// a value. Non-null fields are never overwritten, and a hash collision is
/// never reported as an error.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the transaction fails.
pub async fn insert_coupon(
    pool: &SqlitePool,
    coupon: &NewCoupon,
    now: DateTime<Utc>,
) -> Result<InsertOutcome, DbError> {
    let mut tx = pool.begin().await?;
    let outcome = insert_in_tx(&mut tx, coupon, now).await?;
    tx.commit().await?;
    Ok(outcome)
}

/// Inserts a batch of coupons in order inside one transaction.
///
/// Rows in the same batch share `created_at`; their ids preserve the batch
/// order, which breaks ties in notification ordering.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the transaction fails; no row of the batch
/// is persisted in that case.
pub async fn insert_coupons(
    pool: &SqlitePool,
    coupons: &[NewCoupon],
    now: DateTime<Utc>,
) -> Result<InsertSummary, DbError> {
    let mut summary = InsertSummary::default();
    if coupons.is_empty() {
        return Ok(summary);
    }

    let mut tx = pool.begin().await?;
    for coupon in coupons {
        summary.record(insert_in_tx(&mut tx, coupon, now).await?);
    }
    tx.commit().await?;
    Ok(summary)
}

async fn insert_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    coupon: &NewCoupon,
    now: DateTime<Utc>,
) -> Result<InsertOutcome, DbError> {
    let inserted = sqlx::query(
        "INSERT INTO coupons \
             (name, description, discount_percentage, code, url, source, expiry, created_at, hash) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (hash) DO NOTHING",
    )
    .bind(&coupon.name)
    .bind(&coupon.description)
    .bind(coupon.discount_percentage)
    .bind(&coupon.code)
    .bind(&coupon.url)
    .bind(&coupon.source)
    .bind(coupon.expiry)
    .bind(now)
    .bind(&coupon.hash)
    .execute(&mut **tx)
    .await?;

    if inserted.rows_affected() == 1 {
        return Ok(InsertOutcome::Inserted(inserted.last_insert_rowid()));
    }

    let enriched = sqlx::query(
        "UPDATE coupons SET \
             discount_percentage = COALESCE(discount_percentage, ?1), \
             expiry              = COALESCE(expiry, ?2) \
         WHERE hash = ?3 \
           AND ((discount_percentage IS NULL AND ?1 IS NOT NULL) \
             OR (expiry IS NULL AND ?2 IS NOT NULL))",
    )
    .bind(coupon.discount_percentage)
    .bind(coupon.expiry)
    .bind(&coupon.hash)
    .execute(&mut **tx)
    .await?;

    if enriched.rows_affected() == 1 {
        tracing::debug!(hash = %coupon.hash, "enriched existing coupon");
        Ok(InsertOutcome::Enriched)
    } else {
        Ok(InsertOutcome::Unchanged)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Returns rows due for a liveness check: never validated, currently
/// invalid, or last validated before `stale_before`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_due_for_validation(
    pool: &SqlitePool,
    stale_before: DateTime<Utc>,
) -> Result<Vec<CouponRow>, DbError> {
    let sql = format!(
        "SELECT {COUPON_COLUMNS} FROM coupons \
         WHERE is_valid = 0 OR validated_at IS NULL OR validated_at < ? \
         ORDER BY id"
    );
    let rows = sqlx::query_as::<_, CouponRow>(&sql)
        .bind(stale_before)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Records a definitive `Valid` / `Invalid` verdict.
///
/// Always stamps `validated_at` and resets the inconclusive-probe counter.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the row no longer exists, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_validation_result(
    pool: &SqlitePool,
    id: i64,
    is_valid: bool,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE coupons \
         SET is_valid = ?, validated_at = ?, consecutive_unknowns = 0 \
         WHERE id = ?",
    )
    .bind(is_valid)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Records an inconclusive probe (network failure or timeout).
///
/// Stamps `validated_at` and increments `consecutive_unknowns`. `is_valid`
/// is left untouched until the counter reaches `unknown_threshold`, at
/// which point the row is downgraded to invalid.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the row no longer exists, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_inconclusive_validation(
    pool: &SqlitePool,
    id: i64,
    unknown_threshold: u32,
    now: DateTime<Utc>,
) -> Result<InconclusiveValidation, DbError> {
    // SET expressions see the pre-update row, so both CASE and the counter use the old value.
    let state = sqlx::query_as::<_, InconclusiveValidation>(
        "UPDATE coupons SET \
             validated_at         = ?, \
             consecutive_unknowns = consecutive_unknowns + 1, \
             is_valid = CASE WHEN consecutive_unknowns + 1 >= ? THEN 0 ELSE is_valid END \
         WHERE id = ? \
         RETURNING consecutive_unknowns, is_valid",
    )
    .bind(now)
    .bind(i64::from(unknown_threshold))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(state)
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Returns valid, unposted, non-abandoned rows, oldest discovered first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pending_notifications(pool: &SqlitePool) -> Result<Vec<CouponRow>, DbError> {
    let sql = format!(
        "SELECT {COUPON_COLUMNS} FROM coupons \
         WHERE is_valid = 1 AND is_posted = 0 AND abandoned_at IS NULL \
         ORDER BY created_at ASC, id ASC"
    );
    let rows = sqlx::query_as::<_, CouponRow>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

/// Marks a coupon as posted after confirmed delivery.
///
/// Guarded on `is_valid = 1` so a row invalidated since selection is never
/// flagged as posted. Returns `false` when the guard rejected the update.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_posted(pool: &SqlitePool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE coupons SET is_posted = 1, delivery_failures = 0 \
         WHERE id = ? AND is_valid = 1 AND is_posted = 0",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Records a transient delivery failure, abandoning the row once
/// `max_attempts` consecutive failures have accumulated.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the row no longer exists, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_delivery_failure(
    pool: &SqlitePool,
    id: i64,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<DeliveryFailure, DbError> {
    let state = sqlx::query_as::<_, DeliveryFailure>(
        "UPDATE coupons SET \
             delivery_failures = delivery_failures + 1, \
             abandoned_at = CASE WHEN delivery_failures + 1 >= ? THEN ? ELSE abandoned_at END \
         WHERE id = ? \
         RETURNING delivery_failures, abandoned_at IS NOT NULL AS abandoned",
    )
    .bind(i64::from(max_attempts))
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(state)
}

/// Abandons notification for a row immediately (permanent rejection).
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the row no longer exists, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn abandon_notification(
    pool: &SqlitePool,
    id: i64,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE coupons SET delivery_failures = delivery_failures + 1, abandoned_at = ? \
         WHERE id = ?",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Number of rows whose notification has been abandoned.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_abandoned(pool: &SqlitePool) -> Result<i64, DbError> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM coupons WHERE abandoned_at IS NOT NULL")
            .fetch_one(pool)
            .await?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// Deletes rows whose `expiry` predates `cutoff` (callers pass
/// `now - grace_period`). Validity plays no part in eligibility.
///
/// Returns the number of rows deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_expired(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM coupons WHERE expiry IS NOT NULL AND expiry < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Read-only queries for external collaborators
// ---------------------------------------------------------------------------

/// Fetches a single coupon by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_coupon(pool: &SqlitePool, id: i64) -> Result<CouponRow, DbError> {
    let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = ?");
    let row = sqlx::query_as::<_, CouponRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;
    Ok(row)
}

/// Returns the most recent `limit` coupons that are valid and posted,
/// newest first. This is the feed export's view of the store.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_published_coupons(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<CouponRow>, DbError> {
    let sql = format!(
        "SELECT {COUPON_COLUMNS} FROM coupons \
         WHERE is_valid = 1 AND is_posted = 1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT ?"
    );
    let rows = sqlx::query_as::<_, CouponRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
