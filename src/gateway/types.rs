//! Request/response types and the error-to-status mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::records::Record;
use crate::error::ServiceError;

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub record_id: i64,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl From<Record> for RecordResponse {
    fn from(record: Record) -> Self {
        Self {
            record_id: record.record_id,
            key: record.key,
            value: record.value,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::PoolExhausted(_)
            | ServiceError::PoolClosed
            | ServiceError::ConnectionBroken(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::TransactionFailed(_) | ServiceError::Startup(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = %self, "request failed");
        }
        (status, Json(ErrorResponse::new(self.code(), self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        let cases = [
            (
                ServiceError::PoolExhausted(Duration::from_secs(1)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ServiceError::PoolClosed, StatusCode::SERVICE_UNAVAILABLE),
            (
                ServiceError::ConnectionBroken("io".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServiceError::TransactionFailed("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::NotFound("record 7".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::BadRequest("empty key".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{error}");
        }
    }

    #[test]
    fn error_response_serializes_code_and_message() {
        let body = serde_json::to_value(ErrorResponse::new("NOT_FOUND", "record 7 not found"))
            .expect("serialize");
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["message"], "record 7 not found");
    }
}
