use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::keywords::extraction::ExtractionError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Another keyword operation is already running for resume {0}")]
    OperationInProgress(Uuid),

    #[error("Keyword extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    #[error("Malformed extraction response: {0}")]
    MalformedResponse(String),

    #[error("Keyword analysis failed after {attempts} rate-limited attempts")]
    AnalysisFailed { attempts: u32 },

    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Maps a terminal extraction failure. Rate limits are retried upstream and
    /// only reach this point once the retry budget is spent.
    pub fn from_extraction(err: ExtractionError, attempts: u32) -> Self {
        match err {
            ExtractionError::Unavailable(msg) => AppError::ExtractionUnavailable(msg),
            ExtractionError::Malformed(msg) => AppError::MalformedResponse(msg),
            ExtractionError::RateLimited { .. } => AppError::AnalysisFailed { attempts },
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::PersistenceFailed(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::OperationInProgress(_) => (
                StatusCode::CONFLICT,
                "OPERATION_IN_PROGRESS",
                "Another keyword operation is still running. Try again shortly.".to_string(),
            ),
            AppError::ExtractionUnavailable(msg) => {
                tracing::error!("Extraction unavailable: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "EXTRACTION_UNAVAILABLE",
                    "The keyword extraction service is unavailable".to_string(),
                )
            }
            AppError::MalformedResponse(msg) => {
                tracing::error!("Malformed extraction response: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "MALFORMED_RESPONSE",
                    "The keyword extraction service returned an unreadable response".to_string(),
                )
            }
            AppError::AnalysisFailed { attempts } => {
                tracing::warn!("Analysis gave up after {attempts} rate-limited attempts");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "ANALYSIS_FAILED",
                    "Keyword analysis is busy right now. Please try again later.".to_string(),
                )
            }
            AppError::PersistenceFailed(msg) => {
                tracing::error!("Persistence error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PERSISTENCE_FAILED",
                    "Your changes could not be saved".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
