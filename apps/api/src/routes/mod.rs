pub mod health;
pub mod render;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Records
        .route("/api/v1/records/:name/render", post(render::handle_submit))
        .route("/api/v1/records/:name/source", get(render::handle_source))
        .route("/api/v1/records/:name/pdf", post(render::handle_pdf))
        // Jobs
        .route("/api/v1/render/:task_id/status", get(render::handle_status))
        .with_state(state)
}
