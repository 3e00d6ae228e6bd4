//! Interval-throttled streaming delivery.
//!
//! Slack enforces a minimum interval between edits to the same message;
//! updating the placeholder on every engine snapshot would trip that limit
//! and spend the invocation budget on throttle retries. So snapshots are
//! pushed at most once per update interval, with one final flush after the
//! stream ends.

use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::core::models::Job;
use crate::engine::{AnswerEngine, KEEPALIVE_TEXT};
use crate::errors::BotError;
use crate::slack::Delivery;

/// Appended to partial content delivered after a mid-stream failure.
pub const INCOMPLETE_NOTICE: &str = "_(response may be incomplete)_";

#[derive(Debug, Clone, Copy)]
pub struct StreamingSettings {
    /// Minimum interval between in-place updates.
    pub update_interval: Duration,
    /// Smaller window the final flush waits out after the stream ends.
    pub final_flush: Duration,
}

#[derive(Debug, PartialEq, Eq)]
pub enum StreamingOutcome {
    /// The full answer was delivered.
    Completed,
    /// The stream failed mid-flight but captured content was delivered with
    /// the incomplete-notice appended.
    Partial { error: String },
}

/// Stream an answer into the job's placeholder message.
///
/// # Errors
///
/// Returns an error when nothing user-visible was delivered: the stream
/// could not be opened, failed before any content, or an update call failed.
/// The caller is responsible for the standard failure fallback in that case.
pub async fn run_streaming(
    delivery: &dyn Delivery,
    engine: &dyn AnswerEngine,
    job: &Job,
    settings: StreamingSettings,
) -> Result<StreamingOutcome, BotError> {
    let channel_id = job.channel_id.as_deref().ok_or_else(|| {
        BotError::Validation("streaming dispatch requires a channel_id".to_string())
    })?;
    let placeholder_ts = job.placeholder_ts.as_deref().ok_or_else(|| {
        BotError::Validation("streaming dispatch requires a placeholder_ts".to_string())
    })?;

    let mut stream = engine.open_stream(&job.question_text).await?;

    let mut last_update_at: Option<Instant> = None;
    let mut last_content = String::new();
    let mut delivered = String::new();

    loop {
        match stream.next_chunk().await {
            Ok(Some(chunk)) => {
                if chunk.is_empty() || chunk == KEEPALIVE_TEXT {
                    continue;
                }
                last_content = chunk;

                let due = last_update_at
                    .is_none_or(|at| at.elapsed() >= settings.update_interval);
                if due {
                    delivery
                        .update_message(channel_id, placeholder_ts, &last_content)
                        .await?;
                    delivered.clone_from(&last_content);
                    last_update_at = Some(Instant::now());
                }
            }
            Ok(None) => break,
            Err(e) => {
                if last_content.is_empty() {
                    return Err(e);
                }
                warn!("Engine stream failed mid-flight; delivering partial content");
                let notice = format!("{last_content}\n\n{INCOMPLETE_NOTICE}");
                delivery
                    .update_message(channel_id, placeholder_ts, &notice)
                    .await?;
                return Ok(StreamingOutcome::Partial {
                    error: e.to_string(),
                });
            }
        }
    }

    if last_content.is_empty() {
        return Err(BotError::Generation(
            "engine stream produced no content".to_string(),
        ));
    }

    // Final flush: deliver the unflushed tail, waiting out the remainder of
    // the flush window so the edit rate stays under the platform minimum.
    if delivered != last_content {
        if let Some(at) = last_update_at {
            let elapsed = at.elapsed();
            if elapsed < settings.final_flush {
                tokio::time::sleep(settings.final_flush - elapsed).await;
            }
        }
        delivery
            .update_message(channel_id, placeholder_ts, &last_content)
            .await?;
    }

    Ok(StreamingOutcome::Completed)
}
