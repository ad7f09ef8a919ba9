use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::compile::CompileFailure;
use crate::jobs::{SubmitError, SyncError};
use crate::queue::QueueError;
use crate::records::RecordError;
use crate::render::RenderError;
use crate::storage::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Compilation failed: {0}")]
    CompileFailed(String),

    #[error("Compilation timed out: {0}")]
    CompileTimedOut(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<RecordError> for AppError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::InvalidName(_) => AppError::Validation(err.to_string()),
            RecordError::NotFound(_) => AppError::NotFound(err.to_string()),
            RecordError::Malformed { .. } => AppError::UnprocessableEntity(err.to_string()),
            RecordError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::ContentShape { .. } => AppError::UnprocessableEntity(err.to_string()),
            RenderError::Template(msg) => AppError::Template(msg),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Unavailable(_) => AppError::Unavailable(err.to_string()),
            QueueError::Malformed { .. } => AppError::Internal(anyhow::Error::new(err)),
        }
    }
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Record(e) => e.into(),
            SubmitError::Render(e) => e.into(),
            SubmitError::Bundle(e) => AppError::Internal(anyhow::Error::new(e)),
            SubmitError::Stage {
                source: StoreError::Rejected { .. },
                ..
            } => AppError::Internal(anyhow::Error::new(err)),
            SubmitError::Stage { .. } | SubmitError::Enqueue { .. } | SubmitError::Results { .. } => {
                AppError::Unavailable(err.to_string())
            }
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Render(e) => e.into(),
            SyncError::Compile(CompileFailure::Failed { summary, .. }) => {
                AppError::CompileFailed(summary)
            }
            SyncError::Compile(e @ CompileFailure::TimedOut { .. }) => {
                AppError::CompileTimedOut(e.to_string())
            }
            SyncError::Compile(e @ CompileFailure::Infra(_)) => AppError::Unavailable(e.to_string()),
            SyncError::Io(e) => AppError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Template(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "TEMPLATE_ERROR", msg.clone())
            }
            AppError::CompileFailed(summary) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "COMPILE_FAILED",
                summary.clone(),
            ),
            AppError::CompileTimedOut(msg) => {
                (StatusCode::GATEWAY_TIMEOUT, "COMPILE_TIMED_OUT", msg.clone())
            }
            AppError::Unavailable(msg) => {
                tracing::error!("Dependency unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "A backing service is temporarily unavailable".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
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
