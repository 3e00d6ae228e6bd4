//! API Lambda handler - the operator's diagnostics and recovery surface.
//!
//! Operations are selected by an `op` query parameter. The liveness probe is
//! unauthenticated; everything that reads job content or mutates queue state
//! requires the shared secret. `flush_queue` is destructive and exists for
//! emptying a wedged deployment, not routine use.

use lambda_runtime::{Error, LambdaEvent};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{error, info};

use super::helpers;
use crate::core::config::AppConfig;
use crate::core::models::{DeadLetterEntry, Envelope, Job};
use crate::engine::HttpAnswerEngine;
use crate::errors::BotError;
use crate::queue::{QueueStore, RedisDedupeGuard, RedisQueueStore};
use crate::slack::SlackClient;
use crate::worker::dispatch::{DispatchSettings, Dispatcher};
use crate::worker::streaming::StreamingSettings;

pub use self::function_handler as handler;

const QUESTION_PREVIEW_CHARS: usize = 120;
const ERROR_PREVIEW_CHARS: usize = 200;

/// Lambda handler for the API entrypoint.
///
/// # Errors
///
/// Returns an error only for configuration or connection failures; operation
/// failures are reported as JSON error responses.
#[tracing::instrument(level = "info", skip(event))]
pub async fn function_handler(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let payload = event.payload;
    let op = param(&payload, "op").unwrap_or_else(|| "health".to_string());

    if op == "health" {
        return Ok(helpers::ok_json(&json!({ "status": "healthy" })));
    }

    let config = AppConfig::from_env().map_err(|e| {
        error!("Config error: {}", e);
        Error::from(e)
    })?;

    let secret = param(&payload, "secret").unwrap_or_default();
    if config.admin_secret.is_empty() || secret != config.admin_secret {
        error!(op = %op, "Rejected admin operation: bad shared secret");
        return Ok(helpers::err_response(403, "Invalid or missing shared secret"));
    }

    let client = redis::Client::open(config.redis_url.as_str()).map_err(BotError::from)?;
    let conn = redis::aio::ConnectionManager::new(client)
        .await
        .map_err(BotError::from)?;
    let store = RedisQueueStore::new(conn.clone(), config.queue_key_prefix.as_deref());

    let result = match op.as_str() {
        "inspect" => inspect(&store).await,
        "validate" => validate(&store).await,
        "recover_stuck_jobs" => recover_stuck_jobs(&store).await,
        "flush_queue" => flush_queue(&store).await,
        "inject" => inject(&config, conn, &store, &payload).await,
        other => {
            return Ok(helpers::err_response(
                400,
                &format!("Unknown operation: {other}"),
            ));
        }
    };

    match result {
        Ok(body) => Ok(helpers::ok_json(&body)),
        Err(e) => {
            error!(op = %op, "Admin operation failed: {}", e);
            Ok(helpers::err_response(500, &e.to_string()))
        }
    }
}

/// Queue depths plus a truncated sample of `waiting` and `dead`.
async fn inspect(store: &dyn QueueStore) -> Result<Value, BotError> {
    let depths = store.depths().await?;
    let waiting_head = store.list_waiting(0, 1).await?.into_iter().next();
    let dead_head = store.peek_dead().await?;

    Ok(json!({
        "depths": depths,
        "waiting_head": waiting_head.map(|envelope| envelope_summary(&envelope)),
        "dead_head": dead_head.map(|entry| dead_letter_summary(&entry)),
    }))
}

/// Check timestamp-shaped fields on the head waiting job for Slack's
/// `seconds.fraction` format. Malformed values upstream cause silent
/// delivery failure later, so they are flagged here.
async fn validate(store: &dyn QueueStore) -> Result<Value, BotError> {
    let sample = store.list_waiting(0, 1).await?.into_iter().next();

    match sample {
        Some(envelope) => {
            let job = &envelope.body;
            Ok(json!({
                "sampled": true,
                "fields": {
                    "event_ts": slack_ts_status(job.event_ts.as_deref()),
                    "thread_ts": slack_ts_status(job.thread_ts.as_deref()),
                    "placeholder_ts": slack_ts_status(job.placeholder_ts.as_deref()),
                },
            }))
        }
        None => Ok(json!({ "sampled": false })),
    }
}

async fn recover_stuck_jobs(store: &dyn QueueStore) -> Result<Value, BotError> {
    let recovered = store.recover_stuck().await?;
    info!(recovered, "Recovered stuck jobs");
    Ok(json!({ "recovered": recovered }))
}

async fn flush_queue(store: &dyn QueueStore) -> Result<Value, BotError> {
    store.flush().await?;
    info!("Flushed waiting and processing queues");
    Ok(json!({ "flushed": true }))
}

/// Enqueue a synthetic job and immediately run the worker dispatch once,
/// verifying the queue→worker path without a live platform event.
async fn inject(
    config: &AppConfig,
    conn: redis::aio::ConnectionManager,
    store: &RedisQueueStore,
    payload: &Value,
) -> Result<Value, BotError> {
    let Some(channel_id) = param(payload, "channel") else {
        return Err(BotError::Validation(
            "inject requires a channel parameter".to_string(),
        ));
    };
    let question_text = param(payload, "text")
        .unwrap_or_else(|| "Queue path verification question".to_string());

    let now = chrono::Utc::now();
    let job = Job {
        question_text,
        channel_id: Some(channel_id),
        response_url: None,
        thread_ts: None,
        channel_type: Default::default(),
        placeholder_ts: None,
        event_ts: Some(format!(
            "{}.{:06}",
            now.timestamp(),
            now.timestamp_subsec_micros()
        )),
        use_streaming: false,
    };

    let depth = store.enqueue(&job).await?;

    let guard = RedisDedupeGuard::new(conn, config.dedupe_retention_secs, None);
    let engine = HttpAnswerEngine::new(config.engine_url.clone(), config.engine_api_key.clone());
    let delivery = SlackClient::new(
        config.slack_bot_token.clone(),
        config.delivery_max_attempts,
        Duration::from_millis(config.throttle_pause_ms),
    );
    let dispatcher = Dispatcher {
        store,
        guard: &guard,
        engine: &engine,
        delivery: &delivery,
        settings: DispatchSettings {
            streaming_enabled: config.streaming_enabled,
            streaming: StreamingSettings {
                update_interval: Duration::from_millis(config.stream_update_interval_ms),
                final_flush: Duration::from_millis(config.stream_final_flush_ms),
            },
        },
    };

    let report = dispatcher.run_queued().await?;
    Ok(json!({ "enqueued_depth": depth, "report": report }))
}

fn envelope_summary(envelope: &Envelope) -> Value {
    let job = &envelope.body;
    json!({
        "question_text": helpers::truncate_text(&job.question_text, QUESTION_PREVIEW_CHARS),
        "channel_id": job.channel_id,
        "thread_ts": job.thread_ts,
        "placeholder_ts": job.placeholder_ts,
        "event_ts": job.event_ts,
        "enqueued_at": envelope.enqueued_at,
    })
}

fn dead_letter_summary(entry: &DeadLetterEntry) -> Value {
    json!({
        "stream_id": entry.stream_id,
        "question_text": helpers::truncate_text(&entry.body.question_text, QUESTION_PREVIEW_CHARS),
        "channel_id": entry.body.channel_id,
        "error": helpers::truncate_text(&entry.error, ERROR_PREVIEW_CHARS),
        "timestamp": entry.timestamp,
    })
}

/// Read a parameter from `queryStringParameters` or the top-level payload.
fn param(payload: &Value, name: &str) -> Option<String> {
    payload
        .get("queryStringParameters")
        .and_then(|params| params.get(name))
        .and_then(Value::as_str)
        .or_else(|| payload.get(name).and_then(Value::as_str))
        .map(str::to_string)
}

/// A Slack timestamp has digit seconds, a `.` separator, and a digit
/// sub-second fraction.
fn is_slack_ts(value: &str) -> bool {
    match value.split_once('.') {
        Some((seconds, fraction)) => {
            !seconds.is_empty()
                && !fraction.is_empty()
                && seconds.bytes().all(|b| b.is_ascii_digit())
                && fraction.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

fn slack_ts_status(value: Option<&str>) -> &'static str {
    match value {
        None => "not_present",
        Some(v) if is_slack_ts(v) => "valid",
        Some(_) => "invalid",
    }
}
