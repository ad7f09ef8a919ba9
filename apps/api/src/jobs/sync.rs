//! Synchronous render path: compile inside the request, no queue or store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::compile::{CompileExecutor, CompileFailure};
use crate::models::record::Record;
use crate::render::{RenderError, RenderedDocument, Renderer};
use crate::storage::keys::SOURCE_ARTIFACT;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Compile(#[from] CompileFailure),

    #[error("working directory error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct SyncCompiler {
    renderer: Arc<Renderer>,
    executor: CompileExecutor,
    work_root: PathBuf,
}

impl SyncCompiler {
    pub fn new(renderer: Arc<Renderer>, executor: CompileExecutor, work_root: PathBuf) -> Self {
        Self {
            renderer,
            executor,
            work_root,
        }
    }

    pub fn render(&self, record: &Record) -> Result<RenderedDocument, RenderError> {
        self.renderer.render_record(record)
    }

    /// Renders and compiles `record`, returning the PDF bytes.
    pub async fn compile_pdf(&self, record: &Record) -> Result<Vec<u8>, SyncError> {
        let document = self.render(record)?;

        tokio::fs::create_dir_all(&self.work_root).await?;
        let workdir = tempfile::Builder::new()
            .prefix("sync-")
            .tempdir_in(&self.work_root)?;

        tokio::fs::write(workdir.path().join(SOURCE_ARTIFACT), &document.source).await?;
        copy_assets(self.renderer.templates().root(), workdir.path(), &document).await?;

        let artifact = self.executor.compile(workdir.path(), SOURCE_ARTIFACT).await?;
        info!(
            "Compiled record '{}' v{} synchronously in {}ms",
            record.name,
            record.version,
            artifact.elapsed.as_millis()
        );
        Ok(artifact.bytes)
    }
}

async fn copy_assets(from: &Path, to: &Path, document: &RenderedDocument) -> std::io::Result<()> {
    for asset in &document.assets {
        let target = to.join(asset);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(from.join(asset), &target).await?;
    }
    Ok(())
}
