use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::records::RecordRepository;
use crate::error::ServiceError;

use super::state::AppState;
use super::types::{CreateRecordRequest, ErrorResponse, HealthResponse, RecordResponse};

/// GET /api/v1/health
///
/// Liveness probe that exercises the database path end to end.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ServiceError> {
    state.db.health_check().await?;
    Ok(Json(HealthResponse::ok()))
}

/// GET /api/v1/ready
///
/// Readiness probe for orchestration: 503 until the pool has validated at
/// least one connection at startup.
pub async fn readiness(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !state.is_ready() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("NOT_READY", "service is starting")),
        ));
    }
    Ok(Json(HealthResponse::ok()))
}

/// POST /api/v1/records
pub async fn create_record(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateRecordRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RecordResponse>), ServiceError> {
    let Json(req) = body.map_err(bad_body)?;
    if req.key.trim().is_empty() {
        return Err(ServiceError::BadRequest("key must not be empty".into()));
    }

    let ctx = state.request_context();
    let record = state
        .db
        .with_transaction(&ctx, move |conn| {
            Box::pin(async move {
                RecordRepository::insert(conn, &req.key, &req.value)
                    .await
                    .map_err(crate::db::db_error)
            })
        })
        .await?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// GET /api/v1/records/{record_id}
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    record_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<RecordResponse>, ServiceError> {
    let Path(record_id) = record_id.map_err(bad_path)?;
    let ctx = state.request_context();
    let record = state
        .db
        .with_transaction(&ctx, move |conn| {
            Box::pin(async move {
                RecordRepository::get_by_id(conn, record_id)
                    .await
                    .map_err(crate::db::db_error)
            })
        })
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("record {record_id}")))?;

    Ok(Json(record.into()))
}

/// DELETE /api/v1/records/{record_id}
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    record_id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ServiceError> {
    let Path(record_id) = record_id.map_err(bad_path)?;
    let ctx = state.request_context();
    let deleted = state
        .db
        .with_transaction(&ctx, move |conn| {
            Box::pin(async move {
                RecordRepository::delete(conn, record_id)
                    .await
                    .map_err(crate::db::db_error)
            })
        })
        .await?;

    if !deleted {
        return Err(ServiceError::NotFound(format!("record {record_id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Fallback for unmatched routes.
pub async fn not_found() -> ServiceError {
    ServiceError::NotFound("route".into())
}

// Extractor rejections go through the same JSON error envelope as every
// other failure instead of axum's plain-text defaults.

fn bad_body(rejection: JsonRejection) -> ServiceError {
    ServiceError::BadRequest(rejection.body_text())
}

fn bad_path(rejection: PathRejection) -> ServiceError {
    ServiceError::BadRequest(rejection.body_text())
}
