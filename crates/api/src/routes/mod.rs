//! API Routes

pub mod metrics;
pub mod sessions;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use storage::StorageError;

/// Handler failure mapped onto an HTTP status
pub enum ApiError {
    Storage(StorageError),
    NoSessions,
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NoSessions => (StatusCode::NOT_FOUND, "no sessions recorded".to_string()),
            ApiError::Storage(e @ StorageError::NotFound(_)) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
