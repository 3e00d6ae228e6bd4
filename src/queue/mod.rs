//! The durable job store and the idempotency guard.

pub mod dedupe;
pub mod store;

pub use dedupe::{DedupeGuard, MemoryDedupeGuard, RedisDedupeGuard, job_identity};
pub use store::{ClaimedJob, MemoryQueueStore, QueueDepths, QueueStore, RedisQueueStore};
