//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use dmrelay_types::error::SyncError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors surfaced by the sync controller.
    Sync(SyncError),
    /// No conversation for the requested user.
    NotFound(String),
    /// Authentication failure.
    Unauthorized(String),
    /// Malformed or incomplete request.
    Validation(String),
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        AppError::Sync(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Sync(SyncError::Validation(msg)) | AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Sync(SyncError::Unreachable(user_id)) => (
                StatusCode::NOT_FOUND,
                "USER_UNREACHABLE",
                format!("No deliverable channel for user {user_id}"),
            ),
            AppError::Sync(SyncError::Delivery(reason)) => (
                StatusCode::BAD_GATEWAY,
                "DELIVERY_FAILED",
                format!("Failed to deliver message: {reason}"),
            ),
            AppError::Sync(SyncError::Repository(e)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        };

        let body = json!({
            "data": null,
            "meta": {
                "request_id": "",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
