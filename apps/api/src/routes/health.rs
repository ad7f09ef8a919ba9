use axum::Json;
use serde_json::{json, Value};

use crate::render::escape::CHARMAP_VERSION;

/// GET /health
/// Returns a simple status object with service and charmap versions.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "vellum-api",
        "charmap_version": CHARMAP_VERSION
    }))
}
