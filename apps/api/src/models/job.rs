use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a compile job once it has been enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobState {
    /// Terminal states never change once written.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut
        )
    }
}

/// Message carried by the queue from the orchestrator to a worker.
/// Only object-store keys travel across the queue boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileTask {
    pub job_id: String,
    pub latex_object_key: String,
    pub assets_object_key: String,
    pub output_filename: String,
}

/// Staged inputs of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputKeys {
    pub source: String,
    pub assets: String,
}

/// The job record held by the result backend, keyed by `task_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileJob {
    pub job_id: String,
    pub task_id: String,
    pub state: JobState,
    pub input_keys: InputKeys,
    /// Present only when `state` is `succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    /// Present only when `state` is `failed` or `timed_out`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CompileJob {
    pub fn queued(task_id: &str, task: &CompileTask) -> Self {
        Self {
            job_id: task.job_id.clone(),
            task_id: task_id.to_string(),
            state: JobState::Queued,
            input_keys: InputKeys {
                source: task.latex_object_key.clone(),
                assets: task.assets_object_key.clone(),
            },
            output_key: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn running(mut self) -> Self {
        self.state = JobState::Running;
        self.updated_at = Utc::now();
        self
    }

    pub fn succeeded(mut self, output_key: String) -> Self {
        self.state = JobState::Succeeded;
        self.output_key = Some(output_key);
        self.error = None;
        self.updated_at = Utc::now();
        self
    }

    /// Terminal failure. `state` must be `Failed` or `TimedOut`.
    pub fn finished_with_error(mut self, state: JobState, error: String) -> Self {
        debug_assert!(matches!(state, JobState::Failed | JobState::TimedOut));
        self.state = state;
        self.output_key = None;
        self.error = Some(error);
        self.updated_at = Utc::now();
        self
    }

    /// The worker's terminal report, with the public link resolved.
    pub fn result(&self, urls: &PublicUrlBuilder) -> JobResult {
        JobResult {
            job_id: self.job_id.clone(),
            state: self.state,
            output_url: match self.state {
                JobState::Succeeded => self.output_key.as_deref().map(|k| urls.url_for(k)),
                _ => None,
            },
            error: self.error.clone(),
        }
    }
}

/// Terminal report emitted by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// State as seen by status queries; adds `unknown_job` for expired or
/// never-seen task ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    UnknownJob,
}

impl From<JobState> for StatusState {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Queued => StatusState::Queued,
            JobState::Running => StatusState::Running,
            JobState::Succeeded => StatusState::Succeeded,
            JobState::Failed => StatusState::Failed,
            JobState::TimedOut => StatusState::TimedOut,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: StatusState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    pub fn unknown() -> Self {
        Self {
            state: StatusState::UnknownJob,
            output_url: None,
            error: None,
        }
    }

    pub fn from_job(job: &CompileJob, urls: &PublicUrlBuilder) -> Self {
        let result = job.result(urls);
        Self {
            state: job.state.into(),
            output_url: result.output_url,
            error: match job.state {
                JobState::Failed | JobState::TimedOut => result.error,
                _ => None,
            },
        }
    }
}

/// Builds public links for published keys. Pure string concatenation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUrlBuilder {
    base: String,
}

impl PublicUrlBuilder {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base, key.trim_start_matches('/'))
    }
}
