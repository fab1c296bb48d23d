//! Read-only HTTP surface over the coupon store.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rin_db::{CouponRow, DbError};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

#[derive(Debug, Deserialize)]
struct PublishedQuery {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct CouponItem {
    id: i64,
    name: String,
    description: String,
    discount_percentage: Option<f64>,
    code: String,
    url: String,
    source: String,
    expiry: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    validated_at: Option<DateTime<Utc>>,
    is_valid: bool,
    is_posted: bool,
    abandoned: bool,
}

impl From<CouponRow> for CouponItem {
    fn from(row: CouponRow) -> Self {
        let abandoned = row.is_abandoned();
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            discount_percentage: row.discount_percentage,
            code: row.code,
            url: row.url,
            source: row.source,
            expiry: row.expiry,
            created_at: row.created_at,
            validated_at: row.validated_at,
            is_valid: row.is_valid,
            is_posted: row.is_posted,
            abandoned,
        }
    }
}

impl ResponseMeta {
    fn now() -> Self {
        Self {
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::now(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

fn map_db_error(error: &DbError) -> ApiError {
    if matches!(error, DbError::NotFound) {
        return ApiError::new("not_found", "coupon not found");
    }
    tracing::error!(error = %error, "api: database query failed");
    ApiError::new("internal_error", "database query failed")
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/coupons/published", get(list_published))
        .route("/api/v1/coupons/{id}", get(get_coupon))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let meta = ResponseMeta::now();

    match rin_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "api: health check found database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CouponItem>>, ApiError> {
    let row = rin_db::get_coupon(&state.pool, id)
        .await
        .map_err(|e| map_db_error(&e))?;
    Ok(Json(ApiResponse {
        data: row.into(),
        meta: ResponseMeta::now(),
    }))
}

async fn list_published(
    State(state): State<AppState>,
    Query(query): Query<PublishedQuery>,
) -> Result<Json<ApiResponse<Vec<CouponItem>>>, ApiError> {
    let rows = rin_db::list_published_coupons(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(&e))?;
    Ok(Json(ApiResponse {
        data: rows.into_iter().map(CouponItem::from).collect(),
        meta: ResponseMeta::now(),
    }))
}
