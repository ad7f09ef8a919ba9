use std::sync::Arc;

use crate::jobs::{Orchestrator, SyncCompiler};
use crate::records::RecordSource;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn RecordSource>,
    /// Async path: render, stage, enqueue, status.
    pub orchestrator: Orchestrator,
    /// Sync path: render or compile inside the request.
    pub sync: SyncCompiler,
}
