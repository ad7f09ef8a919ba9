//! Job Orchestrator — the API-facing half of the pipeline.
//!
//! Submit: fetch record → resolve + render → bundle assets → stage →
//!         enqueue → write the `queued` record. Never waits for compilation.
//! Status: task id → state + public URL.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::layout::resolve_record;
use crate::models::job::{CompileJob, CompileTask, JobState, JobStatus, PublicUrlBuilder};
use crate::queue::{QueueError, ResultBackend, TaskBroker};
use crate::records::{RecordError, RecordSource};
use crate::render::bundle::{build_asset_bundle, BundleError};
use crate::render::{RenderError, Renderer};
use crate::storage::keys::KeyLayout;
use crate::storage::{ArtifactStore, StoreError, CONTENT_TYPE_TEX, CONTENT_TYPE_ZIP};

use super::retry::RetryPolicy;

/// Submission lifecycle, as seen by the orchestrator only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitPhase {
    Created,
    Staged,
    Enqueued,
    SubmitFailed,
}

impl fmt::Display for SubmitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmitPhase::Created => "created",
            SubmitPhase::Staged => "staged",
            SubmitPhase::Enqueued => "enqueued",
            SubmitPhase::SubmitFailed => "submit_failed",
        };
        f.write_str(name)
    }
}

/// Returned to the caller; status queries key on `task_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub job_id: String,
    pub task_id: String,
    pub state: JobState,
    pub output_key: String,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to package assets: {0}")]
    Bundle(#[from] BundleError),

    #[error("failed to stage job {job_id}: {source}")]
    Stage {
        job_id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to enqueue job {job_id}: {source}")]
    Enqueue {
        job_id: String,
        #[source]
        source: QueueError,
    },

    #[error("failed to record job {job_id}: {source}")]
    Results {
        job_id: String,
        #[source]
        source: QueueError,
    },
}

impl SubmitError {
    /// The last phase the job reached before failing.
    pub fn reached(&self) -> SubmitPhase {
        match self {
            SubmitError::Record(_)
            | SubmitError::Render(_)
            | SubmitError::Bundle(_)
            | SubmitError::Stage { .. } => SubmitPhase::Created,
            SubmitError::Enqueue { .. } => SubmitPhase::Staged,
            SubmitError::Results { .. } => SubmitPhase::Enqueued,
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    records: Arc<dyn RecordSource>,
    renderer: Arc<Renderer>,
    store: Arc<dyn ArtifactStore>,
    broker: Arc<dyn TaskBroker>,
    results: Arc<dyn ResultBackend>,
    keys: KeyLayout,
    urls: PublicUrlBuilder,
    retry: RetryPolicy,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        records: Arc<dyn RecordSource>,
        renderer: Arc<Renderer>,
        store: Arc<dyn ArtifactStore>,
        broker: Arc<dyn TaskBroker>,
        results: Arc<dyn ResultBackend>,
        keys: KeyLayout,
        urls: PublicUrlBuilder,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            records,
            renderer,
            store,
            broker,
            results,
            keys,
            urls,
            retry,
        }
    }

    pub async fn submit(&self, record_name: &str) -> Result<Submission, SubmitError> {
        let job_id = Uuid::new_v4().to_string();
        info!(job_id = %job_id, phase = %SubmitPhase::Created, "Submitting record '{record_name}'");

        match self.advance(&job_id, record_name).await {
            Ok(submission) => Ok(submission),
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    phase = %SubmitPhase::SubmitFailed,
                    reached = %e.reached(),
                    "Submission failed: {e}"
                );
                Err(e)
            }
        }
    }

    async fn advance(&self, job_id: &str, record_name: &str) -> Result<Submission, SubmitError> {
        let record = self.records.fetch(record_name).await?;
        let resolved = resolve_record(&record);
        let document = self.renderer.render(&record, &resolved)?;
        let bundle = build_asset_bundle(self.renderer.templates().root(), &document.assets)?;

        let task = self.keys.compile_task(job_id);
        self.stage(&task, document.source.into_bytes().into(), bundle.into())
            .await?;
        info!(job_id = %job_id, phase = %SubmitPhase::Staged, "Staged source and {} asset(s)", document.assets.len());

        let task_id = self
            .retry
            .run("enqueue", QueueError::is_transient, || self.broker.enqueue(&task))
            .await
            .map_err(|source| SubmitError::Enqueue {
                job_id: job_id.to_string(),
                source,
            })?;

        let queued = CompileJob::queued(&task_id, &task);
        let created = self
            .retry
            .run("record job", QueueError::is_transient, || self.results.create(&queued))
            .await
            .map_err(|source| {
                error!(job_id = %job_id, task_id = %task_id, "Task enqueued but job record not written");
                SubmitError::Results {
                    job_id: job_id.to_string(),
                    source,
                }
            })?;
        if !created {
            // A worker already picked the task up and wrote its own state.
            info!(task_id = %task_id, "Job record already present, leaving it");
        }

        info!(job_id = %job_id, task_id = %task_id, phase = %SubmitPhase::Enqueued, "Job enqueued");
        Ok(Submission {
            job_id: job_id.to_string(),
            task_id,
            state: JobState::Queued,
            output_key: task.output_filename,
        })
    }

    async fn stage(&self, task: &CompileTask, source: Bytes, bundle: Bytes) -> Result<(), SubmitError> {
        let uploads = [
            (&task.latex_object_key, source, CONTENT_TYPE_TEX),
            (&task.assets_object_key, bundle, CONTENT_TYPE_ZIP),
        ];
        for (key, bytes, content_type) in uploads {
            self.retry
                .run("stage", StoreError::is_transient, || {
                    self.store.put(key, bytes.clone(), content_type)
                })
                .await
                .map_err(|source| SubmitError::Stage {
                    job_id: task.job_id.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Unknown or expired task ids map to `unknown_job`.
    pub async fn status(&self, task_id: &str) -> Result<JobStatus, QueueError> {
        Ok(match self.results.get(task_id).await? {
            Some(job) => JobStatus::from_job(&job, &self.urls),
            None => JobStatus::unknown(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::job::StatusState;
    use crate::queue::{MemoryBroker, MemoryResultBackend};
    use crate::records::MemoryRecordSource;
    use crate::render::tests::{sample_record, TEST_MAIN};
    use crate::render::TemplateSet;
    use crate::storage::MemoryArtifactStore;
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;

    pub(crate) struct Harness {
        pub orchestrator: Orchestrator,
        pub store: Arc<MemoryArtifactStore>,
        pub broker: Arc<MemoryBroker>,
        pub results: Arc<MemoryResultBackend>,
        pub records: Arc<MemoryRecordSource>,
        pub keys: KeyLayout,
        pub urls: PublicUrlBuilder,
    }

    pub(crate) fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    /// Orchestrator over in-memory backends and a template directory
    /// written into `templates_dir`.
    pub(crate) fn harness(templates_dir: &Path) -> Harness {
        std::fs::write(templates_dir.join("resume_main.tex"), TEST_MAIN).unwrap();
        std::fs::write(templates_dir.join("vellum-cv.cls"), "% class").unwrap();
        let templates = TemplateSet::load(templates_dir).unwrap();

        let store = Arc::new(MemoryArtifactStore::new());
        let broker = Arc::new(MemoryBroker::new());
        let results = Arc::new(MemoryResultBackend::new());
        let records = Arc::new(MemoryRecordSource::with_records([sample_record()]));
        let keys = KeyLayout::new("resumes", "resume-jobs");
        let urls = PublicUrlBuilder::new("https://cdn.example.com");

        let orchestrator = Orchestrator::new(
            records.clone(),
            Arc::new(Renderer::new(templates)),
            store.clone(),
            broker.clone(),
            results.clone(),
            keys.clone(),
            urls.clone(),
            fast_retry(),
        );
        Harness {
            orchestrator,
            store,
            broker,
            results,
            records,
            keys,
            urls,
        }
    }

    #[tokio::test]
    async fn test_submit_then_status_is_never_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());

        let submission = h.orchestrator.submit("backend").await.unwrap();
        assert_eq!(submission.state, JobState::Queued);
        assert_eq!(
            submission.output_key,
            format!("resumes/resume-jobs/{}/resume.pdf", submission.job_id)
        );

        let status = h.orchestrator.status(&submission.task_id).await.unwrap();
        assert_eq!(status.state, StatusState::Queued);
        assert!(status.output_url.is_none());
        assert_eq!(h.broker.pending(), 1);
    }

    #[tokio::test]
    async fn test_submit_stages_only_source_and_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());

        let submission = h.orchestrator.submit("backend").await.unwrap();
        let keys = h
            .store
            .list(&h.keys.job_root(&submission.job_id))
            .await
            .unwrap();
        assert_eq!(
            keys,
            vec![
                h.keys.artifact(&submission.job_id, "assets.zip"),
                h.keys.artifact(&submission.job_id, "resume.tex"),
            ]
        );
        let source = h
            .store
            .get(&h.keys.artifact(&submission.job_id, "resume.tex"))
            .await
            .unwrap();
        assert!(std::str::from_utf8(&source).unwrap().contains("\\cvsection{Skills}"));
    }

    #[tokio::test]
    async fn test_content_shape_error_is_synchronous_and_nothing_is_queued() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let mut record = sample_record();
        record.sections[2].content = json!({ "bullets": ["wrong shape"] });
        h.records.insert(record);

        let err = h.orchestrator.submit("backend").await.unwrap_err();
        assert!(matches!(err, SubmitError::Render(RenderError::ContentShape { .. })));
        assert_eq!(err.reached(), SubmitPhase::Created);
        assert_eq!(h.broker.pending(), 0);
        assert_eq!(h.store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_record_fails_submission() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let err = h.orchestrator.submit("nobody").await.unwrap_err();
        assert!(matches!(err, SubmitError::Record(RecordError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_transient_staging_outage_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        h.store.fail_next(2);

        let submission = h.orchestrator.submit("backend").await.unwrap();
        assert!(!submission.task_id.is_empty());
        assert_eq!(h.broker.pending(), 1);
    }

    #[tokio::test]
    async fn test_rejected_staging_write_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        h.store.reject_next(1);

        let err = h.orchestrator.submit("backend").await.unwrap_err();
        assert!(matches!(
            err,
            SubmitError::Stage { source: StoreError::Rejected { .. }, .. }
        ));
        assert_eq!(h.store.put_count(), 0);
        assert_eq!(h.broker.pending(), 0);
    }

    #[tokio::test]
    async fn test_persistent_staging_outage_never_enqueues() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        h.store.fail_next(10);

        let err = h.orchestrator.submit("backend").await.unwrap_err();
        assert!(matches!(err, SubmitError::Stage { .. }));
        assert_eq!(h.broker.pending(), 0);
    }

    #[tokio::test]
    async fn test_broker_outage_reports_staged_phase() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        h.broker.fail_next(10);

        let err = h.orchestrator.submit("backend").await.unwrap_err();
        assert!(matches!(err, SubmitError::Enqueue { .. }));
        assert_eq!(err.reached(), SubmitPhase::Staged);
    }

    #[tokio::test]
    async fn test_status_of_unknown_task_is_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        let status = h.orchestrator.status("no-such-task").await.unwrap();
        assert_eq!(status.state, StatusState::UnknownJob);

        let submission = h.orchestrator.submit("backend").await.unwrap();
        h.results.expire(&submission.task_id);
        let status = h.orchestrator.status(&submission.task_id).await.unwrap();
        assert_eq!(status.state, StatusState::UnknownJob);
    }
}
