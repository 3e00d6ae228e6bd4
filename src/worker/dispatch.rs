//! The per-invocation dispatch state machine.
//!
//! One dispatch pulls a job through: validation, the idempotency check,
//! mode selection, generation, delivery, and the error-to-user-message
//! fallback. The dispatcher owns no persistent state; everything durable
//! lives in the queue store.

use serde::Serialize;
use tracing::{error, info};

use super::streaming::{self, StreamingOutcome, StreamingSettings};
use super::ANSWER_FAILURE_MESSAGE;
use crate::core::models::Job;
use crate::engine::AnswerEngine;
use crate::errors::BotError;
use crate::queue::{DedupeGuard, QueueStore, job_identity};
use crate::slack::Delivery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Success,
    PartialSuccess,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Standard,
    Streaming,
}

/// Terminal result of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub status: DispatchStatus,
    pub mode: DispatchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DispatchReport {
    fn new(status: DispatchStatus, mode: DispatchMode) -> Self {
        Self {
            status,
            mode,
            detail: None,
        }
    }

    fn with_detail(status: DispatchStatus, mode: DispatchMode, detail: String) -> Self {
        Self {
            status,
            mode,
            detail: Some(detail),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub streaming_enabled: bool,
    pub streaming: StreamingSettings,
}

pub struct Dispatcher<'a> {
    pub store: &'a dyn QueueStore,
    pub guard: &'a dyn DedupeGuard,
    pub engine: &'a dyn AnswerEngine,
    pub delivery: &'a dyn Delivery,
    pub settings: DispatchSettings,
}

impl Dispatcher<'_> {
    /// Run the state machine for one job.
    ///
    /// # Errors
    ///
    /// Returns `BotError::Validation` for a malformed job (no side effects
    /// have happened) and `BotError::Store` if the idempotency guard is
    /// unreachable. Generation and delivery failures do not surface here;
    /// they end in an `error` report after the user-facing fallback.
    pub async fn dispatch(&self, job: &Job) -> Result<DispatchReport, BotError> {
        job.validate()?;

        let mode = self.choose_mode(job);

        // Mark as processed before generation starts, to close the
        // duplicate-delivery race as tightly as possible. There is no
        // long-lived process to host a periodic sweep, so retention eviction
        // piggybacks on guard use.
        if let Some(identity) = job_identity(job) {
            self.guard.sweep().await?;
            if !self.guard.should_process(&identity).await? {
                info!(identity = %identity, "Duplicate job suppressed");
                return Ok(DispatchReport::new(DispatchStatus::Skipped, mode));
            }
        }

        match mode {
            DispatchMode::Streaming => self.dispatch_streaming(job).await,
            DispatchMode::Standard => self.dispatch_standard(job).await,
        }
    }

    /// Claim one job from the queue and dispatch it, acking the outcome.
    ///
    /// Returns `None` when `waiting` is empty.
    ///
    /// # Errors
    ///
    /// Store failures propagate. A job rejected by validation or lost to a
    /// guard failure is dead-lettered before the error is returned.
    pub async fn run_queued(&self) -> Result<Option<DispatchReport>, BotError> {
        let Some(claim) = self.store.claim_next().await? else {
            return Ok(None);
        };

        let report = match self.dispatch(&claim.envelope.body).await {
            Ok(report) => report,
            Err(e) => {
                self.store.ack_failure(&claim, &e.to_string()).await?;
                return Err(e);
            }
        };

        match report.status {
            DispatchStatus::Error => {
                let detail = report.detail.as_deref().unwrap_or("dispatch failed");
                self.store.ack_failure(&claim, detail).await?;
            }
            _ => self.store.ack_success(&claim).await?,
        }

        Ok(Some(report))
    }

    fn choose_mode(&self, job: &Job) -> DispatchMode {
        let eligible = self.settings.streaming_enabled
            && job.use_streaming
            && job.placeholder_ts.is_some()
            && job.channel_id.is_some();
        if eligible {
            DispatchMode::Streaming
        } else {
            DispatchMode::Standard
        }
    }

    async fn dispatch_standard(&self, job: &Job) -> Result<DispatchReport, BotError> {
        match self.engine.generate(&job.question_text).await {
            Ok(answer) => match self.deliver_answer(job, &answer).await {
                Ok(()) => Ok(DispatchReport::new(
                    DispatchStatus::Success,
                    DispatchMode::Standard,
                )),
                Err(e) => {
                    self.deliver_failure_notice(job).await;
                    error!("Failed to deliver answer: {}", e);
                    Ok(DispatchReport::with_detail(
                        DispatchStatus::Error,
                        DispatchMode::Standard,
                        e.to_string(),
                    ))
                }
            },
            Err(e) => {
                self.deliver_failure_notice(job).await;
                error!("Failed to generate answer: {}", e);
                Ok(DispatchReport::with_detail(
                    DispatchStatus::Error,
                    DispatchMode::Standard,
                    e.to_string(),
                ))
            }
        }
    }

    async fn dispatch_streaming(&self, job: &Job) -> Result<DispatchReport, BotError> {
        match streaming::run_streaming(self.delivery, self.engine, job, self.settings.streaming)
            .await
        {
            Ok(StreamingOutcome::Completed) => Ok(DispatchReport::new(
                DispatchStatus::Success,
                DispatchMode::Streaming,
            )),
            Ok(StreamingOutcome::Partial { error }) => {
                error!("Stream failed after partial delivery: {}", error);
                Ok(DispatchReport::with_detail(
                    DispatchStatus::PartialSuccess,
                    DispatchMode::Streaming,
                    error,
                ))
            }
            Err(e) => {
                self.deliver_failure_notice(job).await;
                error!("Streaming answer failed: {}", e);
                Ok(DispatchReport::with_detail(
                    DispatchStatus::Error,
                    DispatchMode::Streaming,
                    e.to_string(),
                ))
            }
        }
    }

    /// Deliver the final answer. Branch order matters: a job with a
    /// placeholder but no channel is invalid for the post-new-message branch
    /// yet still deliverable, so the placeholder is always checked first.
    async fn deliver_answer(&self, job: &Job, answer: &str) -> Result<(), BotError> {
        if let (Some(channel_id), Some(placeholder_ts)) =
            (job.channel_id.as_deref(), job.placeholder_ts.as_deref())
        {
            return self
                .delivery
                .update_message(channel_id, placeholder_ts, answer)
                .await;
        }

        if let Some(channel_id) = job.channel_id.as_deref() {
            return self
                .delivery
                .post_message(channel_id, answer, job.reply_thread())
                .await;
        }

        if let Some(response_url) = job.response_url.as_deref() {
            return self.delivery.post_webhook(response_url, answer).await;
        }

        // validate() makes this unreachable for admitted jobs.
        Err(BotError::Validation(
            "job has no delivery destination".to_string(),
        ))
    }

    /// Best-effort user-visible warning; failures are logged, never raised,
    /// so the original error is what reaches the operational logs.
    async fn deliver_failure_notice(&self, job: &Job) {
        let result = if let (Some(channel_id), Some(placeholder_ts)) =
            (job.channel_id.as_deref(), job.placeholder_ts.as_deref())
        {
            self.delivery
                .update_message(channel_id, placeholder_ts, ANSWER_FAILURE_MESSAGE)
                .await
        } else if let Some(response_url) = job.response_url.as_deref() {
            self.delivery
                .post_webhook(response_url, ANSWER_FAILURE_MESSAGE)
                .await
        } else if let Some(channel_id) = job.channel_id.as_deref() {
            self.delivery
                .post_message(channel_id, ANSWER_FAILURE_MESSAGE, job.reply_thread())
                .await
        } else {
            Ok(())
        };

        if let Err(e) = result {
            error!("Failed to deliver failure notice: {}", e);
        }
    }
}
