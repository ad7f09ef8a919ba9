use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::errors::AppError;
use crate::jobs::Submission;
use crate::models::job::JobStatus;
use crate::state::AppState;
use crate::storage::{CONTENT_TYPE_PDF, CONTENT_TYPE_TEX};

/// POST /api/v1/records/:name/render
/// Renders and stages the record, enqueues a compile job and returns its ids.
pub async fn handle_submit(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<Submission>), AppError> {
    let submission = state.orchestrator.submit(&name).await?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

/// GET /api/v1/render/:task_id/status
pub async fn handle_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<JobStatus>, AppError> {
    Ok(Json(state.orchestrator.status(&task_id).await?))
}

/// GET /api/v1/records/:name/source
/// Returns the rendered LaTeX without compiling it.
pub async fn handle_source(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let record = state.records.fetch(&name).await?;
    let document = state.sync.render(&record)?;
    Ok((
        [(header::CONTENT_TYPE, format!("{CONTENT_TYPE_TEX}; charset=utf-8"))],
        document.source,
    )
        .into_response())
}

/// POST /api/v1/records/:name/pdf
/// Renders and compiles in the request. Subject to the same time limits
/// as the worker.
pub async fn handle_pdf(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let record = state.records.fetch(&name).await?;
    let pdf = state.sync.compile_pdf(&record).await?;
    Ok((
        [
            (header::CONTENT_TYPE, CONTENT_TYPE_PDF.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{name}.pdf\""),
            ),
        ],
        pdf,
    )
        .into_response())
}
