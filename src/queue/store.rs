//! Redis list-backed job store (durable, at-least-once).
//!
//! Jobs live in three lists: `waiting`, `processing`, `dead`. Claiming is a
//! single atomic `LMOVE waiting processing`, so a claimed element is never
//! lost: a worker killed mid-job leaves it visible in `processing`, where
//! the operator `recover_stuck` tool moves it back to `waiting`. There is no
//! lease or timeout-based redelivery; recovery is deliberately manual.
//!
//! List elements are JSON. Enqueued jobs are written as [`Envelope`]s; bare
//! [`Job`] objects pushed by an external producer are accepted and wrapped at
//! decode time.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use tracing::warn;

use crate::core::models::{DeadLetterEntry, Envelope, Job, JobPayload};
use crate::errors::BotError;

const DEFAULT_KEY_PREFIX: &str = "lore:jobs";

/// Depth of each job list, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueDepths {
    pub waiting: u64,
    pub processing: u64,
    pub dead: u64,
}

/// A job moved into `processing` by [`QueueStore::claim_next`].
///
/// Holds the raw list element so the acks can remove exactly the claimed
/// entry and nothing else.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub envelope: Envelope,
    raw: String,
}

impl ClaimedJob {
    fn decode(raw: String) -> Result<Self, BotError> {
        let payload: JobPayload = serde_json::from_str(&raw).map_err(|e| {
            BotError::Store(format!("claimed element fits neither job shape: {e}"))
        })?;
        Ok(Self {
            envelope: payload.into_envelope(),
            raw,
        })
    }
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append a job to the tail of `waiting`. Returns the resulting depth.
    async fn enqueue(&self, job: &Job) -> Result<u64, BotError>;

    /// Atomically move the head of `waiting` into `processing`.
    ///
    /// Single-pop semantics only; this does not make the claimer the sole
    /// processor of the job.
    async fn claim_next(&self) -> Result<Option<ClaimedJob>, BotError>;

    /// Remove a successfully processed job from `processing`. Nothing else
    /// is tracked for completed jobs.
    async fn ack_success(&self, claim: &ClaimedJob) -> Result<(), BotError>;

    /// Park a failed job on `dead` with its error context and remove it from
    /// `processing`.
    async fn ack_failure(&self, claim: &ClaimedJob, error: &str) -> Result<(), BotError>;

    /// Read-only window into `waiting`.
    async fn list_waiting(&self, offset: usize, count: usize) -> Result<Vec<Envelope>, BotError>;

    /// Most recent dead-letter entry, if any.
    async fn peek_dead(&self) -> Result<Option<DeadLetterEntry>, BotError>;

    async fn depths(&self) -> Result<QueueDepths, BotError>;

    /// Move every `processing` element back to the tail of `waiting`,
    /// preserving order. Returns the number recovered.
    async fn recover_stuck(&self) -> Result<u64, BotError>;

    /// Clear `waiting` and `processing`. Destructive; admin-gated by callers.
    async fn flush(&self) -> Result<(), BotError>;
}

#[derive(Clone)]
pub struct RedisQueueStore {
    conn: ConnectionManager,
    waiting_key: String,
    processing_key: String,
    dead_key: String,
}

impl RedisQueueStore {
    #[must_use]
    pub fn new(conn: ConnectionManager, key_prefix: Option<&str>) -> Self {
        let prefix = key_prefix.unwrap_or(DEFAULT_KEY_PREFIX);
        Self {
            conn,
            waiting_key: format!("{prefix}:waiting"),
            processing_key: format!("{prefix}:processing"),
            dead_key: format!("{prefix}:dead"),
        }
    }

    /// Open a connection manager for `redis_url` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns `BotError::Store` if the client cannot be created or the
    /// connection cannot be established.
    pub async fn connect(redis_url: &str, key_prefix: Option<&str>) -> Result<Self, BotError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, key_prefix))
    }

    async fn lmove(&self, source: &str, destination: &str) -> Result<Option<String>, BotError> {
        let mut conn = self.conn.clone();
        let moved: Option<String> = redis::cmd("LMOVE")
            .arg(source)
            .arg(destination)
            .arg("LEFT")
            .arg("RIGHT")
            .query_async(&mut conn)
            .await?;
        Ok(moved)
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn enqueue(&self, job: &Job) -> Result<u64, BotError> {
        let element = serde_json::to_string(&Envelope::new(job.clone()))?;
        let mut conn = self.conn.clone();
        let depth: u64 = conn.rpush(&self.waiting_key, element).await?;
        Ok(depth)
    }

    async fn claim_next(&self) -> Result<Option<ClaimedJob>, BotError> {
        match self.lmove(&self.waiting_key, &self.processing_key).await? {
            // A decode failure leaves the element in `processing` for the
            // operator tools; the store never discards data on its own.
            Some(raw) => ClaimedJob::decode(raw).map(Some),
            None => Ok(None),
        }
    }

    async fn ack_success(&self, claim: &ClaimedJob) -> Result<(), BotError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.lrem(&self.processing_key, 1, &claim.raw).await?;
        if removed == 0 {
            warn!("acked job was no longer in processing (recovered or flushed concurrently)");
        }
        Ok(())
    }

    async fn ack_failure(&self, claim: &ClaimedJob, error: &str) -> Result<(), BotError> {
        let entry = DeadLetterEntry::new(claim.envelope.body.clone(), error.to_string());
        let element = serde_json::to_string(&entry)?;
        let mut conn = self.conn.clone();
        let _: u64 = conn.lpush(&self.dead_key, element).await?;
        let _: u64 = conn.lrem(&self.processing_key, 1, &claim.raw).await?;
        Ok(())
    }

    async fn list_waiting(&self, offset: usize, count: usize) -> Result<Vec<Envelope>, BotError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let start = isize::try_from(offset).unwrap_or(isize::MAX);
        let stop = start.saturating_add(isize::try_from(count).unwrap_or(isize::MAX) - 1);
        let mut conn = self.conn.clone();
        let elements: Vec<String> = conn.lrange(&self.waiting_key, start, stop).await?;

        let mut envelopes = Vec::with_capacity(elements.len());
        for raw in elements {
            let payload: JobPayload = serde_json::from_str(&raw)
                .map_err(|e| BotError::Store(format!("waiting element is malformed: {e}")))?;
            envelopes.push(payload.into_envelope());
        }
        Ok(envelopes)
    }

    async fn peek_dead(&self) -> Result<Option<DeadLetterEntry>, BotError> {
        let mut conn = self.conn.clone();
        let elements: Vec<String> = conn.lrange(&self.dead_key, 0, 0).await?;
        match elements.into_iter().next() {
            Some(raw) => {
                let entry: DeadLetterEntry = serde_json::from_str(&raw)
                    .map_err(|e| BotError::Store(format!("dead element is malformed: {e}")))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn depths(&self) -> Result<QueueDepths, BotError> {
        let mut conn = self.conn.clone();
        let waiting: u64 = conn.llen(&self.waiting_key).await?;
        let processing: u64 = conn.llen(&self.processing_key).await?;
        let dead: u64 = conn.llen(&self.dead_key).await?;
        Ok(QueueDepths {
            waiting,
            processing,
            dead,
        })
    }

    async fn recover_stuck(&self) -> Result<u64, BotError> {
        let mut recovered = 0u64;
        while self
            .lmove(&self.processing_key, &self.waiting_key)
            .await?
            .is_some()
        {
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn flush(&self) -> Result<(), BotError> {
        let mut conn = self.conn.clone();
        let _: u64 = conn
            .del(vec![self.waiting_key.clone(), self.processing_key.clone()])
            .await?;
        Ok(())
    }
}

/// In-process store implementing the identical contract, for tests and local
/// runs without a Redis.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    waiting: Mutex<VecDeque<String>>,
    processing: Mutex<VecDeque<String>>,
    dead: Mutex<VecDeque<String>>,
}

impl MemoryQueueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, job: &Job) -> Result<u64, BotError> {
        let element = serde_json::to_string(&Envelope::new(job.clone()))?;
        let mut waiting = self.waiting.lock().expect("queue lock poisoned");
        waiting.push_back(element);
        Ok(waiting.len() as u64)
    }

    async fn claim_next(&self) -> Result<Option<ClaimedJob>, BotError> {
        let popped = self
            .waiting
            .lock()
            .expect("queue lock poisoned")
            .pop_front();
        match popped {
            Some(raw) => {
                self.processing
                    .lock()
                    .expect("queue lock poisoned")
                    .push_back(raw.clone());
                ClaimedJob::decode(raw).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn ack_success(&self, claim: &ClaimedJob) -> Result<(), BotError> {
        let mut processing = self.processing.lock().expect("queue lock poisoned");
        if let Some(pos) = processing.iter().position(|raw| *raw == claim.raw) {
            processing.remove(pos);
        }
        Ok(())
    }

    async fn ack_failure(&self, claim: &ClaimedJob, error: &str) -> Result<(), BotError> {
        let entry = DeadLetterEntry::new(claim.envelope.body.clone(), error.to_string());
        let element = serde_json::to_string(&entry)?;
        self.dead
            .lock()
            .expect("queue lock poisoned")
            .push_front(element);
        let mut processing = self.processing.lock().expect("queue lock poisoned");
        if let Some(pos) = processing.iter().position(|raw| *raw == claim.raw) {
            processing.remove(pos);
        }
        Ok(())
    }

    async fn list_waiting(&self, offset: usize, count: usize) -> Result<Vec<Envelope>, BotError> {
        let waiting = self.waiting.lock().expect("queue lock poisoned");
        let mut envelopes = Vec::new();
        for raw in waiting.iter().skip(offset).take(count) {
            let payload: JobPayload = serde_json::from_str(raw)
                .map_err(|e| BotError::Store(format!("waiting element is malformed: {e}")))?;
            envelopes.push(payload.into_envelope());
        }
        Ok(envelopes)
    }

    async fn peek_dead(&self) -> Result<Option<DeadLetterEntry>, BotError> {
        let dead = self.dead.lock().expect("queue lock poisoned");
        match dead.front() {
            Some(raw) => {
                let entry: DeadLetterEntry = serde_json::from_str(raw)
                    .map_err(|e| BotError::Store(format!("dead element is malformed: {e}")))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn depths(&self) -> Result<QueueDepths, BotError> {
        Ok(QueueDepths {
            waiting: self.waiting.lock().expect("queue lock poisoned").len() as u64,
            processing: self.processing.lock().expect("queue lock poisoned").len() as u64,
            dead: self.dead.lock().expect("queue lock poisoned").len() as u64,
        })
    }

    async fn recover_stuck(&self) -> Result<u64, BotError> {
        let mut processing = self.processing.lock().expect("queue lock poisoned");
        let mut waiting = self.waiting.lock().expect("queue lock poisoned");
        let mut recovered = 0u64;
        while let Some(raw) = processing.pop_front() {
            waiting.push_back(raw);
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn flush(&self) -> Result<(), BotError> {
        self.waiting.lock().expect("queue lock poisoned").clear();
        self.processing.lock().expect("queue lock poisoned").clear();
        Ok(())
    }
}
