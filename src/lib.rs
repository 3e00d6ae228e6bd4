//! lore - a Slack Q&A assistant that answers questions asynchronously.
//!
//! This crate implements a two-Lambda architecture:
//! 1. A Worker Lambda that claims queued questions, runs the answer engine,
//!    and delivers the result back to the originating conversation.
//! 2. An API Lambda that exposes the diagnostics and recovery surface
//!    (queue inspection, stuck-job recovery, flush, manual job injection).
//!
//! # Architecture
//!
//! The system uses:
//! - AWS Lambda for serverless execution
//! - Redis lists (`waiting` / `processing` / `dead`) as the shared job store
//! - slack-morphism and the raw Slack Web API for delivery
//! - Tokio for async runtime
//!
//! Answer generation is an external collaborator behind the
//! [`engine::AnswerEngine`] trait; this crate only owns the hand-off between
//! "a question arrived" and "an answer was posted". Delivery is at-least-once:
//! a duplicate trigger can re-run a job, and the idempotency guard suppresses
//! the duplicate visible side effect on a best-effort basis.

// Module declarations
pub mod api;
pub mod core;
pub mod engine;
pub mod errors;
pub mod queue;
pub mod slack;
pub mod worker;

pub use errors::BotError;

/// Configure structured logging with JSON format for AWS Lambda environments.
///
/// Sets up tracing-subscriber with a JSON formatter suitable for `CloudWatch`
/// Logs integration. Call once at the start of each Lambda binary.
pub fn setup_logging() {
    use tracing_subscriber::prelude::*;
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    tracing_subscriber::registry().with(fmt_layer).init();
}
