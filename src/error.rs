use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Credit not found: {0}")]
    CreditNotFound(String),

    #[error("Insufficient credits: {0}")]
    InsufficientCredits(String),

    #[error("Credit ineligible: {0}")]
    CreditIneligible(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Stable machine-readable code, also recorded on failed executions and batch items
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::InvalidFormat(_) => "INVALID_FORMAT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::CreditNotFound(_) => "CREDIT_NOT_FOUND",
            ApiError::InsufficientCredits(_) => "INSUFFICIENT_CREDITS",
            ApiError::CreditIneligible(_) => "CREDIT_INELIGIBLE",
            ApiError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            ApiError::Persistence(_) => "PERSISTENCE_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::ConcurrencyConflict(msg),
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Timeout(msg) => ApiError::Persistence(format!("timed out: {}", msg)),
            StoreError::Database(e) => ApiError::Persistence(e.to_string()),
            StoreError::Backend(msg) => ApiError::Persistence(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match self {
            ApiError::Validation(ref msg) | ApiError::InvalidFormat(ref msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ApiError::NotFound(ref msg) | ApiError::CreditNotFound(ref msg) => {
                (StatusCode::NOT_FOUND, msg.clone())
            }
            ApiError::InsufficientCredits(ref msg) | ApiError::CreditIneligible(ref msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            ApiError::ConcurrencyConflict(ref msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Persistence(ref msg) => {
                tracing::error!("Persistence error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal database error occurred".to_string(),
                )
            }
            ApiError::Unauthorized(ref msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
