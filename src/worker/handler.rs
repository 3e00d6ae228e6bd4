//! Lambda handler for the Worker entrypoint.
//!
//! Accepts three invocation shapes: a push-trigger delivery carrying a job
//! (bare or envelope, optionally wrapped API-gateway style with a JSON string
//! `body`), an empty trigger that claims the next job from the queue store,
//! and an uptime probe that must never touch the queue.

use lambda_runtime::{Error, LambdaEvent};
use serde_json::{Value, json};
use tracing::{error, info};

use super::dispatch::{DispatchSettings, Dispatcher};
use super::streaming::StreamingSettings;
use crate::api::helpers;
use crate::core::config::AppConfig;
use crate::core::models::{Job, JobPayload};
use crate::engine::HttpAnswerEngine;
use crate::errors::BotError;
use crate::queue::{RedisDedupeGuard, RedisQueueStore};
use crate::slack::SlackClient;
use std::time::Duration;

pub use self::function_handler as handler;

pub async fn function_handler(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let payload = event.payload;

    // Uptime probes short-circuit before config or queue access.
    if is_health_probe(&payload) {
        return Ok(helpers::ok_json(&json!({ "status": "healthy" })));
    }

    let config = AppConfig::from_env().map_err(|e| {
        error!("Config error: {}", e);
        Error::from(e)
    })?;
    info!("Worker received payload: {:?}", payload);

    let job = match extract_job(&payload) {
        Ok(job) => job,
        Err(msg) => {
            error!("Failed to parse job payload: {}", msg);
            return Ok(helpers::err_response(400, &msg));
        }
    };

    let client = redis::Client::open(config.redis_url.as_str()).map_err(BotError::from)?;
    let conn = redis::aio::ConnectionManager::new(client)
        .await
        .map_err(BotError::from)?;
    let store = RedisQueueStore::new(conn.clone(), config.queue_key_prefix.as_deref());
    let guard = RedisDedupeGuard::new(conn, config.dedupe_retention_secs, None);
    let engine = HttpAnswerEngine::new(config.engine_url.clone(), config.engine_api_key.clone());
    let delivery = SlackClient::new(
        config.slack_bot_token.clone(),
        config.delivery_max_attempts,
        Duration::from_millis(config.throttle_pause_ms),
    );

    let dispatcher = Dispatcher {
        store: &store,
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

    match job {
        Some(job) => match dispatcher.dispatch(&job).await {
            Ok(report) => {
                info!("Dispatch finished: {:?}", report);
                Ok(helpers::ok_json(&serde_json::to_value(&report)?))
            }
            Err(BotError::Validation(msg)) => {
                error!("Rejected invalid job: {}", msg);
                Ok(helpers::err_response(400, &msg))
            }
            Err(e) => {
                error!("Dispatch failed: {}", e);
                Err(Error::from(e))
            }
        },
        None => match dispatcher.run_queued().await {
            Ok(Some(report)) => {
                info!("Queued dispatch finished: {:?}", report);
                Ok(helpers::ok_json(&serde_json::to_value(&report)?))
            }
            Ok(None) => Ok(helpers::ok_json(&json!({ "status": "empty" }))),
            Err(e) => {
                error!("Queued dispatch failed: {}", e);
                Err(Error::from(e))
            }
        },
    }
}

fn is_health_probe(payload: &Value) -> bool {
    payload
        .get("queryStringParameters")
        .and_then(|params| params.get("health"))
        .is_some()
        || payload
            .get("health_check")
            .and_then(Value::as_bool)
            .unwrap_or(false)
}

/// Pull a job out of the invocation payload, if one was delivered with it.
///
/// `Ok(None)` means "no job attached, claim from the queue instead"; `Err`
/// means a body was attached but fits neither job shape.
fn extract_job(payload: &Value) -> Result<Option<Job>, String> {
    let candidate = if let Some(body) = payload.get("body") {
        if let Some(raw) = body.as_str() {
            Some(
                serde_json::from_str::<Value>(raw)
                    .map_err(|e| format!("request body is not valid JSON: {e}"))?,
            )
        } else if body.is_object() {
            // The payload itself is an envelope.
            Some(payload.clone())
        } else {
            None
        }
    } else if payload.get("question_text").is_some() {
        Some(payload.clone())
    } else {
        None
    };

    match candidate {
        Some(value) => serde_json::from_value::<JobPayload>(value)
            .map(|p| Some(p.into_job()))
            .map_err(|e| format!("payload fits neither job shape: {e}")),
        None => Ok(None),
    }
}
