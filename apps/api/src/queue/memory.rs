//! In-process broker and result backend, used by tests and the
//! single-process development setup.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use super::{Delivery, QueueError, QueuedTask, ResultBackend, TaskBroker};
use crate::models::job::{CompileJob, CompileTask};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct BrokerState {
    queue: VecDeque<String>,
    in_flight: HashMap<String, Vec<String>>,
}

#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    ready: Notify,
    outages: AtomicU32,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `calls` enqueues fail as if the broker were down.
    pub fn fail_next(&self, calls: u32) {
        self.outages.store(calls, Ordering::SeqCst);
    }

    pub fn pending(&self) -> usize {
        lock(&self.state).queue.len()
    }

    pub fn in_flight(&self, worker_id: &str) -> usize {
        lock(&self.state)
            .in_flight
            .get(worker_id)
            .map_or(0, Vec::len)
    }

    /// Pushes an already-encoded message, as a redelivery would.
    pub fn push_raw(&self, raw: String) {
        lock(&self.state).queue.push_back(raw);
        self.ready.notify_one();
    }

    fn try_reserve(&self, worker_id: &str) -> Option<String> {
        let mut state = lock(&self.state);
        let raw = state.queue.pop_front()?;
        state
            .in_flight
            .entry(worker_id.to_string())
            .or_default()
            .push(raw.clone());
        Some(raw)
    }
}

#[async_trait]
impl TaskBroker for MemoryBroker {
    async fn enqueue(&self, task: &CompileTask) -> Result<String, QueueError> {
        let tripped = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(QueueError::Unavailable("simulated outage".to_string()));
        }

        let task_id = Uuid::new_v4().to_string();
        let envelope = QueuedTask {
            task_id: task_id.clone(),
            task: task.clone(),
            enqueued_at: Utc::now(),
        };
        let raw = serde_json::to_string(&envelope).map_err(|e| QueueError::Malformed {
            key: task_id.clone(),
            reason: e.to_string(),
        })?;
        self.push_raw(raw);
        Ok(task_id)
    }

    async fn reserve(
        &self,
        worker_id: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(raw) = self.try_reserve(worker_id) {
                return match Delivery::decode(raw.clone()) {
                    Ok(delivery) => Ok(Some(delivery)),
                    Err(_) => {
                        self.drop_in_flight(worker_id, &raw);
                        Ok(None)
                    }
                };
            }
            if tokio::time::timeout_at(deadline, self.ready.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, worker_id: &str, delivery: &Delivery) -> Result<(), QueueError> {
        self.drop_in_flight(worker_id, &delivery.raw);
        Ok(())
    }

    async fn requeue(&self, worker_id: &str, delivery: &Delivery) -> Result<(), QueueError> {
        self.drop_in_flight(worker_id, &delivery.raw);
        self.push_raw(delivery.raw.clone());
        Ok(())
    }

    async fn recover_in_flight(&self, worker_id: &str) -> Result<usize, QueueError> {
        let mut state = lock(&self.state);
        let messages = state.in_flight.remove(worker_id).unwrap_or_default();
        let moved = messages.len();
        state.queue.extend(messages);
        drop(state);
        if moved > 0 {
            self.ready.notify_waiters();
        }
        Ok(moved)
    }
}

impl MemoryBroker {
    fn drop_in_flight(&self, worker_id: &str, raw: &str) {
        let mut state = lock(&self.state);
        if let Some(list) = state.in_flight.get_mut(worker_id) {
            if let Some(pos) = list.iter().position(|m| m == raw) {
                list.remove(pos);
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryResultBackend {
    jobs: Mutex<HashMap<String, CompileJob>>,
}

impl MemoryResultBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a record, as TTL expiry would.
    pub fn expire(&self, task_id: &str) {
        lock(&self.jobs).remove(task_id);
    }
}

#[async_trait]
impl ResultBackend for MemoryResultBackend {
    async fn create(&self, job: &CompileJob) -> Result<bool, QueueError> {
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(&job.task_id) {
            return Ok(false);
        }
        jobs.insert(job.task_id.clone(), job.clone());
        Ok(true)
    }

    async fn update(&self, job: &CompileJob) -> Result<bool, QueueError> {
        let mut jobs = lock(&self.jobs);
        if jobs
            .get(&job.task_id)
            .is_some_and(|existing| existing.state.is_terminal())
        {
            return Ok(false);
        }
        jobs.insert(job.task_id.clone(), job.clone());
        Ok(true)
    }

    async fn get(&self, task_id: &str) -> Result<Option<CompileJob>, QueueError> {
        Ok(lock(&self.jobs).get(task_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobState;

    fn task(job_id: &str) -> CompileTask {
        CompileTask {
            job_id: job_id.into(),
            latex_object_key: format!("{job_id}/resume.tex"),
            assets_object_key: format!("{job_id}/assets.zip"),
            output_filename: format!("{job_id}/resume.pdf"),
        }
    }

    #[tokio::test]
    async fn test_reserve_ack_cycle() {
        let broker = MemoryBroker::new();
        let task_id = broker.enqueue(&task("j1")).await.unwrap();

        let delivery = broker
            .reserve("w1", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.task_id, task_id);
        assert_eq!(broker.in_flight("w1"), 1);

        broker.ack("w1", &delivery).await.unwrap();
        assert_eq!(broker.in_flight("w1"), 0);
        assert_eq!(broker.pending(), 0);
    }

    #[tokio::test]
    async fn test_requeue_returns_delivery_to_queue() {
        let broker = MemoryBroker::new();
        let task_id = broker.enqueue(&task("j1")).await.unwrap();
        let delivery = broker
            .reserve("w1", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        broker.requeue("w1", &delivery).await.unwrap();
        assert_eq!(broker.in_flight("w1"), 0);
        assert_eq!(broker.pending(), 1);

        let again = broker
            .reserve("w2", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.task_id, task_id);
    }

    #[tokio::test]
    async fn test_reserve_times_out_when_empty() {
        let broker = MemoryBroker::new();
        let got = broker.reserve("w1", Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_unacked_messages_are_recovered() {
        let broker = MemoryBroker::new();
        broker.enqueue(&task("j1")).await.unwrap();
        let first = broker
            .reserve("w1", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(broker.recover_in_flight("w1").await.unwrap(), 1);
        let again = broker
            .reserve("w1", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.task_id, first.task_id);
    }

    #[tokio::test]
    async fn test_enqueue_outage() {
        let broker = MemoryBroker::new();
        broker.fail_next(1);
        assert!(broker.enqueue(&task("j1")).await.unwrap_err().is_transient());
        assert!(broker.enqueue(&task("j1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_terminal_record_is_never_overwritten() {
        let backend = MemoryResultBackend::new();
        let queued = CompileJob::queued("t1", &task("j1"));
        assert!(backend.create(&queued).await.unwrap());
        assert!(!backend.create(&queued).await.unwrap());

        let done = queued.clone().running().succeeded("j1/resume.pdf".into());
        assert!(backend.update(&done).await.unwrap());
        assert!(!backend.update(&queued.clone().running()).await.unwrap());

        let stored = backend.get("t1").await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Succeeded);
    }
}
