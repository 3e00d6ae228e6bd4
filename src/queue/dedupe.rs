//! Best-effort duplicate-delivery suppression.
//!
//! Push triggers redeliver: the same event can invoke the worker twice. The
//! guard records each job identity on first claim and answers "already seen"
//! within the retention window. This suppresses duplicate visible side
//! effects; it is not a substitute for the queue's own state and does not
//! make delivery exactly-once.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};

use crate::core::models::Job;
use crate::errors::BotError;

const DEFAULT_KEY_PREFIX: &str = "lore:seen";

/// Stable identity for a job: the conversation scope (thread, else channel)
/// plus the platform event id. `None` when the job carries no event id.
#[must_use]
pub fn job_identity(job: &Job) -> Option<String> {
    let event_ts = job.event_ts.as_deref()?;
    let scope = job
        .thread_ts
        .as_deref()
        .or(job.channel_id.as_deref())?;

    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update(b":");
    hasher.update(event_ts.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

#[async_trait]
pub trait DedupeGuard: Send + Sync {
    /// True exactly once per identity within the retention window; the first
    /// call records the identity.
    async fn should_process(&self, identity: &str) -> Result<bool, BotError>;

    /// Evict expired records. Returns the number evicted.
    async fn sweep(&self) -> Result<usize, BotError>;
}

/// Process-local guard. Only protects against duplicate triggers landing on
/// the same warm instance; independently scaled instances share nothing.
pub struct MemoryDedupeGuard {
    seen: Mutex<HashMap<String, Instant>>,
    retention: Duration,
}

impl MemoryDedupeGuard {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            retention,
        }
    }
}

#[async_trait]
impl DedupeGuard for MemoryDedupeGuard {
    async fn should_process(&self, identity: &str) -> Result<bool, BotError> {
        let mut seen = self.seen.lock().expect("dedupe lock poisoned");
        match seen.get(identity) {
            Some(first_seen) if first_seen.elapsed() < self.retention => Ok(false),
            _ => {
                seen.insert(identity.to_string(), Instant::now());
                Ok(true)
            }
        }
    }

    async fn sweep(&self) -> Result<usize, BotError> {
        let mut seen = self.seen.lock().expect("dedupe lock poisoned");
        let before = seen.len();
        let retention = self.retention;
        seen.retain(|_, first_seen| first_seen.elapsed() < retention);
        Ok(before - seen.len())
    }
}

/// Shared guard backed by the same Redis as the queue: `SET NX EX`, so the
/// record is visible to every concurrently scheduled instance and expires on
/// its own.
#[derive(Clone)]
pub struct RedisDedupeGuard {
    conn: ConnectionManager,
    key_prefix: String,
    retention_secs: u64,
}

impl RedisDedupeGuard {
    #[must_use]
    pub fn new(conn: ConnectionManager, retention_secs: u64, key_prefix: Option<&str>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.unwrap_or(DEFAULT_KEY_PREFIX).to_string(),
            retention_secs,
        }
    }
}

#[async_trait]
impl DedupeGuard for RedisDedupeGuard {
    async fn should_process(&self, identity: &str) -> Result<bool, BotError> {
        let key = format!("{}:{identity}", self.key_prefix);
        let mut conn = self.conn.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(chrono::Utc::now().timestamp())
            .arg("NX")
            .arg("EX")
            .arg(self.retention_secs)
            .query_async(&mut conn)
            .await?;
        Ok(set.is_some())
    }

    async fn sweep(&self) -> Result<usize, BotError> {
        // Key TTLs do the eviction.
        Ok(0)
    }
}
