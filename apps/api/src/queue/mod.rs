//! Durable task queue and result backend.
//!
//! The broker delivers each [`CompileTask`] at least once: a reserved message
//! stays in the worker's in-flight list until it is acknowledged, and
//! in-flight messages are returned to the queue when a worker restarts.
//! The result backend holds one [`CompileJob`] per task id; once a record is
//! terminal it is never overwritten.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::job::{CompileJob, CompileTask};

pub use self::memory::{MemoryBroker, MemoryResultBackend};
pub use self::redis::{RedisBroker, RedisResultBackend};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),

    #[error("malformed record for '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

impl QueueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Unavailable(_))
    }
}

/// Wire envelope placed on the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task_id: String,
    pub task: CompileTask,
    pub enqueued_at: DateTime<Utc>,
}

/// A reserved message. Must be passed back to [`TaskBroker::ack`] once the
/// job has a terminal record.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub task_id: String,
    pub task: CompileTask,
    /// The message exactly as stored, used to remove it on ack.
    pub(crate) raw: String,
}

impl Delivery {
    pub(crate) fn decode(raw: String) -> Result<Self, QueueError> {
        let envelope: QueuedTask =
            serde_json::from_str(&raw).map_err(|e| QueueError::Malformed {
                key: "queue message".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            task_id: envelope.task_id,
            task: envelope.task,
            raw,
        })
    }
}

#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Enqueues `task` and returns the broker-assigned task id.
    async fn enqueue(&self, task: &CompileTask) -> Result<String, QueueError>;

    /// Waits up to `wait` for a message and moves it to `worker_id`'s
    /// in-flight list.
    async fn reserve(&self, worker_id: &str, wait: Duration)
        -> Result<Option<Delivery>, QueueError>;

    /// Drops a delivery from the in-flight list.
    async fn ack(&self, worker_id: &str, delivery: &Delivery) -> Result<(), QueueError>;

    /// Moves a delivery from the in-flight list back onto the queue.
    async fn requeue(&self, worker_id: &str, delivery: &Delivery) -> Result<(), QueueError>;

    /// Returns every in-flight message of `worker_id` to the queue.
    /// Called when a worker starts, before it reserves anything.
    async fn recover_in_flight(&self, worker_id: &str) -> Result<usize, QueueError>;
}

#[async_trait]
pub trait ResultBackend: Send + Sync {
    /// Stores `job` only if no record exists for its task id.
    /// Returns whether the record was written.
    async fn create(&self, job: &CompileJob) -> Result<bool, QueueError>;

    /// Replaces the record unless the stored one is already terminal.
    /// Returns whether the record was written.
    async fn update(&self, job: &CompileJob) -> Result<bool, QueueError>;

    async fn get(&self, task_id: &str) -> Result<Option<CompileJob>, QueueError>;
}

pub(crate) fn encode_job(job: &CompileJob) -> Result<String, QueueError> {
    serde_json::to_string(job).map_err(|e| QueueError::Malformed {
        key: job.task_id.clone(),
        reason: e.to_string(),
    })
}

pub(crate) fn decode_job(task_id: &str, raw: &str) -> Result<CompileJob, QueueError> {
    serde_json::from_str(raw).map_err(|e| QueueError::Malformed {
        key: task_id.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_decodes_envelope() {
        let envelope = QueuedTask {
            task_id: "t-1".into(),
            task: CompileTask {
                job_id: "j-1".into(),
                latex_object_key: "a/resume.tex".into(),
                assets_object_key: "a/assets.zip".into(),
                output_filename: "a/resume.pdf".into(),
            },
            enqueued_at: Utc::now(),
        };
        let raw = serde_json::to_string(&envelope).unwrap();
        let delivery = Delivery::decode(raw.clone()).unwrap();
        assert_eq!(delivery.task_id, "t-1");
        assert_eq!(delivery.task.job_id, "j-1");
        assert_eq!(delivery.raw, raw);
    }

    #[test]
    fn test_garbage_message_is_malformed() {
        let err = Delivery::decode("{not json".into()).unwrap_err();
        assert!(matches!(err, QueueError::Malformed { .. }));
        assert!(!err.is_transient());
    }
}
