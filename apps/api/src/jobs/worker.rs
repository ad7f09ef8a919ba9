//! Compile Worker — the consume half of the pipeline.
//!
//! Per delivery: skip if already terminal → `running` → download staged
//! input into a private temp dir → compile → publish → terminal record → ack.
//! The temp dir is dropped on every path out of [`CompileWorker::process`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::compile::{CompileExecutor, CompileFailure};
use crate::models::job::{CompileJob, CompileTask, JobResult, JobState, PublicUrlBuilder};
use crate::queue::{Delivery, QueueError, ResultBackend, TaskBroker};
use crate::render::bundle::{extract_bundle, BundleError};
use crate::storage::keys::SOURCE_ARTIFACT;
use crate::storage::{ArtifactStore, StoreError, CONTENT_TYPE_PDF};

use super::retry::RetryPolicy;

const RESERVE_WAIT: Duration = Duration::from_secs(5);
const WORKDIR_PREFIX: &str = "job-";

/// Why a single attempt at a job did not publish an output.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Compile(#[from] CompileFailure),

    #[error("asset bundle rejected: {0}")]
    Bundle(#[from] BundleError),

    #[error("working directory error: {0}")]
    Workdir(#[from] std::io::Error),
}

impl AttemptError {
    fn is_transient(&self) -> bool {
        match self {
            AttemptError::Store(e) => e.is_transient(),
            AttemptError::Compile(e) => e.is_transient(),
            AttemptError::Workdir(_) => true,
            AttemptError::Bundle(_) => false,
        }
    }

    fn terminal_state(&self) -> JobState {
        match self {
            AttemptError::Compile(CompileFailure::TimedOut { .. }) => JobState::TimedOut,
            _ => JobState::Failed,
        }
    }

    /// Client-facing summary. Never carries host paths.
    fn summary(&self) -> String {
        match self {
            AttemptError::Compile(CompileFailure::Failed { summary, .. }) => {
                format!("LaTeX compilation failed: {summary}")
            }
            AttemptError::Compile(CompileFailure::TimedOut { limit, .. }) => {
                format!("compilation exceeded the {}s time limit", limit.as_secs())
            }
            AttemptError::Compile(CompileFailure::Infra(_)) => {
                "compiler could not be run".to_string()
            }
            AttemptError::Store(StoreError::NotFound { key }) => {
                format!("staged input '{key}' is missing")
            }
            AttemptError::Store(StoreError::Unavailable { .. }) => {
                "artifact store unavailable".to_string()
            }
            AttemptError::Store(StoreError::Rejected { .. }) => {
                "artifact store rejected the request".to_string()
            }
            AttemptError::Bundle(BundleError::UnsafeEntry(entry)) => {
                format!("asset bundle entry '{entry}' is not allowed")
            }
            AttemptError::Bundle(_) => "asset bundle could not be unpacked".to_string(),
            AttemptError::Workdir(_) => "worker could not prepare a working directory".to_string(),
        }
    }
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    /// A terminal record was written for this delivery.
    Completed(JobResult),
    /// The task already had a terminal record; nothing was done.
    Duplicate(JobState),
}

pub struct CompileWorker {
    id: String,
    broker: Arc<dyn TaskBroker>,
    results: Arc<dyn ResultBackend>,
    store: Arc<dyn ArtifactStore>,
    executor: CompileExecutor,
    urls: PublicUrlBuilder,
    retry: RetryPolicy,
    work_dir: PathBuf,
}

impl CompileWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: &str,
        broker: Arc<dyn TaskBroker>,
        results: Arc<dyn ResultBackend>,
        store: Arc<dyn ArtifactStore>,
        executor: CompileExecutor,
        urls: PublicUrlBuilder,
        retry: RetryPolicy,
        work_root: &Path,
    ) -> Self {
        let safe_id: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect();
        Self {
            id: id.to_string(),
            broker,
            results,
            store,
            executor,
            urls,
            retry,
            work_dir: work_root.join(safe_id),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Clears leftovers of a previous run and reclaims its in-flight
    /// deliveries. Must run before the first `reserve`.
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .with_context(|| format!("Failed to create work dir {}", self.work_dir.display()))?;
        let swept = sweep_stale_dirs(&self.work_dir).await?;
        if swept > 0 {
            warn!("Removed {swept} stale working dir(s) from a previous run");
        }

        let recovered = self
            .broker
            .recover_in_flight(&self.id)
            .await
            .context("Failed to recover in-flight deliveries")?;
        info!(
            worker_id = %self.id,
            recovered,
            "Worker ready (work dir: {})",
            self.work_dir.display()
        );
        Ok(())
    }

    /// Runs `concurrency` consume loops until `shutdown` flips to true.
    /// In-progress jobs are finished before returning.
    pub async fn run(self: Arc<Self>, concurrency: usize, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.prepare().await?;

        let mut loops = JoinSet::new();
        for slot in 0..concurrency.max(1) {
            let worker = Arc::clone(&self);
            let shutdown = shutdown.clone();
            loops.spawn(async move { worker.consume(slot, shutdown).await });
        }
        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!("Worker loop panicked: {e}");
            }
        }
        info!(worker_id = %self.id, "Worker stopped");
        Ok(())
    }

    async fn consume(&self, slot: usize, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = self.retry.base_delay;
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                reserved = self.broker.reserve(&self.id, RESERVE_WAIT) => match reserved {
                    Ok(Some(delivery)) => {
                        backoff = self.retry.base_delay;
                        self.handle(delivery).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(slot, "Reserve failed ({e}), retrying after {}ms...", backoff.as_millis());
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.retry.max_delay);
                    }
                },
            }
        }
    }

    /// Processes a delivery and acknowledges it once a terminal record exists.
    /// Otherwise the delivery goes back on the queue; if even that fails it
    /// stays in flight until the next start.
    pub async fn handle(&self, delivery: Delivery) {
        match self.process(&delivery.task_id, &delivery.task).await {
            Ok(_) => {
                if let Err(e) = self.broker.ack(&self.id, &delivery).await {
                    warn!(task_id = %delivery.task_id, "Ack failed, task may be redelivered: {e}");
                }
            }
            Err(e) => {
                error!(task_id = %delivery.task_id, "Could not record job outcome, requeueing: {e}");
                if let Err(e) = self.broker.requeue(&self.id, &delivery).await {
                    error!(task_id = %delivery.task_id, "Requeue failed, leaving in flight: {e}");
                }
            }
        }
    }

    pub async fn process(&self, task_id: &str, task: &CompileTask) -> Result<Processed, QueueError> {
        let existing = self
            .retry
            .run("load job", QueueError::is_transient, || self.results.get(task_id))
            .await?;
        if let Some(job) = existing.as_ref().filter(|j| j.state.is_terminal()) {
            info!(task_id = %task_id, state = ?job.state, "Duplicate delivery of a finished job, skipping");
            return Ok(Processed::Duplicate(job.state));
        }

        let running = existing
            .unwrap_or_else(|| CompileJob::queued(task_id, task))
            .running();
        self.retry
            .run("mark running", QueueError::is_transient, || self.results.update(&running))
            .await?;
        info!(job_id = %task.job_id, task_id = %task_id, "Compiling");

        let outcome = self
            .retry
            .run("compile job", AttemptError::is_transient, || self.attempt(task))
            .await;

        let terminal = match outcome {
            Ok(()) => {
                info!(job_id = %task.job_id, "Published {}", task.output_filename);
                running.succeeded(task.output_filename.clone())
            }
            Err(e) => {
                let state = e.terminal_state();
                warn!(job_id = %task.job_id, state = ?state, "Job did not succeed: {e}");
                running.finished_with_error(state, e.summary())
            }
        };

        let written = self
            .retry
            .run("record result", QueueError::is_transient, || self.results.update(&terminal))
            .await?;
        if !written {
            // Another delivery of the same task finished first.
            info!(task_id = %task_id, "Terminal record already present");
        }
        Ok(Processed::Completed(terminal.result(&self.urls)))
    }

    /// One full download → compile → upload pass in a fresh directory.
    async fn attempt(&self, task: &CompileTask) -> Result<(), AttemptError> {
        let workdir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir_in(&self.work_dir)?;

        let source = self.store.get(&task.latex_object_key).await?;
        tokio::fs::write(workdir.path().join(SOURCE_ARTIFACT), &source).await?;

        let bundle = self.store.get(&task.assets_object_key).await?;
        extract_bundle(&bundle, workdir.path())?;

        let artifact = self.executor.compile(workdir.path(), SOURCE_ARTIFACT).await?;
        self.store
            .put(&task.output_filename, Bytes::from(artifact.bytes), CONTENT_TYPE_PDF)
            .await?;
        Ok(())
    }
}

async fn sweep_stale_dirs(dir: &Path) -> Result<usize> {
    let mut swept = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(WORKDIR_PREFIX) {
            continue;
        }
        let path = entry.path();
        let removed = if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => swept += 1,
            Err(e) => warn!("Could not remove {}: {e}", path.display()),
        }
    }
    Ok(swept)
}
