//! Redis-backed broker and result backend.
//!
//! # Key Schema
//!
//! | Key Pattern | Type | Purpose |
//! |-------------|------|---------|
//! | `{prefix}:queue` | List | Pending messages (LPUSH in, BRPOPLPUSH out) |
//! | `{prefix}:processing:{worker_id}` | List | Messages a worker has reserved |
//! | `{prefix}:job:{task_id}` | String (JSON) | Job record, expires after the result TTL |

use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{RedisError, Script};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{decode_job, encode_job, Delivery, QueueError, QueuedTask, ResultBackend, TaskBroker};
use crate::models::job::{CompileJob, CompileTask};

/// Writes the record unless the stored one is terminal.
///
/// KEYS[1] = job key. ARGV[1] = job JSON, ARGV[2] = TTL seconds.
/// Returns 1 when written, 0 when the stored record is terminal.
const LUA_UPDATE_UNLESS_TERMINAL: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
    local ok, decoded = pcall(cjson.decode, current)
    if ok and type(decoded) == 'table' then
        local state = decoded['state']
        if state == 'succeeded' or state == 'failed' or state == 'timed_out' then
            return 0
        end
    end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', tonumber(ARGV[2]))
return 1
"#;

fn unavailable(err: RedisError) -> QueueError {
    QueueError::Unavailable(err.to_string())
}

async fn connect(url: &str) -> Result<(::redis::Client, MultiplexedConnection), QueueError> {
    let client = ::redis::Client::open(url).map_err(unavailable)?;
    let conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(unavailable)?;
    Ok((client, conn))
}

// ────────────────────────────────────────────────────────────────────────────
// Broker
// ────────────────────────────────────────────────────────────────────────────

pub struct RedisBroker {
    conn: MultiplexedConnection,
    /// Blocking pops get their own connection so they never stall
    /// commands pipelined on `conn`.
    blocking: Mutex<MultiplexedConnection>,
    prefix: String,
}

impl RedisBroker {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, QueueError> {
        let (client, conn) = connect(url).await?;
        let blocking = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        info!("Redis broker connected (prefix: {prefix})");
        Ok(Self {
            conn,
            blocking: Mutex::new(blocking),
            prefix: prefix.to_string(),
        })
    }

    fn queue_key(&self) -> String {
        format!("{}:queue", self.prefix)
    }

    fn processing_key(&self, worker_id: &str) -> String {
        format!("{}:processing:{worker_id}", self.prefix)
    }
}

#[async_trait]
impl TaskBroker for RedisBroker {
    async fn enqueue(&self, task: &CompileTask) -> Result<String, QueueError> {
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

        let _: i64 = ::redis::cmd("LPUSH")
            .arg(self.queue_key())
            .arg(&raw)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(unavailable)?;
        Ok(task_id)
    }

    async fn reserve(
        &self,
        worker_id: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let processing = self.processing_key(worker_id);
        let timeout_secs = wait.as_secs().max(1);

        let raw: Option<String> = {
            let mut conn = self.blocking.lock().await;
            ::redis::cmd("BRPOPLPUSH")
                .arg(self.queue_key())
                .arg(&processing)
                .arg(timeout_secs)
                .query_async(&mut *conn)
                .await
                .map_err(unavailable)?
        };

        let Some(raw) = raw else {
            return Ok(None);
        };

        match Delivery::decode(raw.clone()) {
            Ok(delivery) => Ok(Some(delivery)),
            Err(e) => {
                // Unreadable messages can never succeed; drop them.
                warn!("Discarding malformed queue message: {e}");
                let _: i64 = ::redis::cmd("LREM")
                    .arg(&processing)
                    .arg(1)
                    .arg(&raw)
                    .query_async(&mut self.conn.clone())
                    .await
                    .map_err(unavailable)?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, worker_id: &str, delivery: &Delivery) -> Result<(), QueueError> {
        let _: i64 = ::redis::cmd("LREM")
            .arg(self.processing_key(worker_id))
            .arg(1)
            .arg(&delivery.raw)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn requeue(&self, worker_id: &str, delivery: &Delivery) -> Result<(), QueueError> {
        let _: () = ::redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(self.processing_key(worker_id))
            .arg(1)
            .arg(&delivery.raw)
            .ignore()
            .cmd("LPUSH")
            .arg(self.queue_key())
            .arg(&delivery.raw)
            .ignore()
            .query_async(&mut self.conn.clone())
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn recover_in_flight(&self, worker_id: &str) -> Result<usize, QueueError> {
        let processing = self.processing_key(worker_id);
        let mut conn = self.conn.clone();
        let mut moved = 0;
        loop {
            let raw: Option<String> = ::redis::cmd("RPOPLPUSH")
                .arg(&processing)
                .arg(self.queue_key())
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
            if raw.is_none() {
                break;
            }
            moved += 1;
        }
        if moved > 0 {
            info!("Re-queued {moved} in-flight message(s) for worker {worker_id}");
        }
        Ok(moved)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Result backend
// ────────────────────────────────────────────────────────────────────────────

pub struct RedisResultBackend {
    conn: MultiplexedConnection,
    prefix: String,
    ttl: Duration,
}

impl RedisResultBackend {
    pub async fn connect(url: &str, prefix: &str, ttl: Duration) -> Result<Self, QueueError> {
        let (_, conn) = connect(url).await?;
        info!(
            "Redis result backend connected (prefix: {prefix}, ttl: {}s)",
            ttl.as_secs()
        );
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
            ttl,
        })
    }

    fn job_key(&self, task_id: &str) -> String {
        format!("{}:job:{task_id}", self.prefix)
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl ResultBackend for RedisResultBackend {
    async fn create(&self, job: &CompileJob) -> Result<bool, QueueError> {
        let data = encode_job(job)?;
        let written: Option<String> = ::redis::cmd("SET")
            .arg(self.job_key(&job.task_id))
            .arg(data)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs())
            .query_async(&mut self.conn.clone())
            .await
            .map_err(unavailable)?;
        Ok(written.is_some())
    }

    async fn update(&self, job: &CompileJob) -> Result<bool, QueueError> {
        let data = encode_job(job)?;
        let script = Script::new(LUA_UPDATE_UNLESS_TERMINAL);
        let written: i64 = script
            .key(self.job_key(&job.task_id))
            .arg(data)
            .arg(self.ttl_secs())
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(unavailable)?;
        Ok(written == 1)
    }

    async fn get(&self, task_id: &str) -> Result<Option<CompileJob>, QueueError> {
        let raw: Option<String> = ::redis::cmd("GET")
            .arg(self.job_key(task_id))
            .query_async(&mut self.conn.clone())
            .await
            .map_err(unavailable)?;
        raw.map(|r| decode_job(task_id, &r)).transpose()
    }
}
