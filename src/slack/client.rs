//! Slack API client module
//!
//! Encapsulates all outbound Slack calls with throttle-aware retry. Slack
//! enforces a fixed per-channel message rate (about one per second), so a
//! throttled call is retried after a fixed pause slightly above that floor
//! rather than with exponential backoff. Any non-throttling error propagates
//! immediately: retrying an invalid destination only burns the invocation's
//! execution budget and delays the user-visible failure message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use slack_morphism::hyper_tokio::{SlackClientHyperConnector, SlackHyperClient};
use slack_morphism::prelude::SlackApiChatPostMessageRequest;
use slack_morphism::{SlackApiToken, SlackApiTokenValue, SlackChannelId, SlackMessageContent};
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::warn;

use crate::errors::BotError;

// Build the Slack client connector safely without panicking.
// If connector construction fails, store None and surface an error at call sites.
static SLACK_CLIENT: std::sync::LazyLock<Option<SlackHyperClient>> =
    std::sync::LazyLock::new(|| match SlackClientHyperConnector::new() {
        Ok(connector) => Some(SlackHyperClient::new(connector)),
        Err(e) => {
            warn!("Failed to create Slack HTTP connector: {}", e);
            None
        }
    });

static HTTP_CLIENT: std::sync::LazyLock<Client> = std::sync::LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new())
});

/// Retry `operation` on throttling errors only, with a fixed pause between
/// attempts. `max_attempts` counts the initial call.
pub(crate) async fn retry_on_throttle<F, Fut, T>(
    max_attempts: u32,
    pause: Duration,
    operation: F,
) -> Result<T, BotError>
where
    F: FnMut() -> Fut + Send,
    Fut: std::future::Future<Output = Result<T, BotError>> + Send,
    T: Send,
{
    let retries = max_attempts.saturating_sub(1) as usize;
    let strategy = FixedInterval::new(pause).take(retries);
    RetryIf::spawn(strategy, operation, BotError::is_throttle).await
}

/// Outbound message operations, as the dispatcher sees them.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// `chat.postMessage`, threaded when `thread_ts` is given.
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), BotError>;

    /// `chat.update`: replace the text of an existing message in place.
    async fn update_message(&self, channel_id: &str, ts: &str, text: &str)
    -> Result<(), BotError>;

    /// POST to a Slack response URL.
    async fn post_webhook(&self, response_url: &str, text: &str) -> Result<(), BotError>;
}

/// Slack API client with throttle-aware retry.
pub struct SlackClient {
    token: SlackApiToken,
    max_attempts: u32,
    throttle_pause: Duration,
}

impl SlackClient {
    #[must_use]
    pub fn new(token: String, max_attempts: u32, throttle_pause: Duration) -> Self {
        Self {
            token: SlackApiToken::new(SlackApiTokenValue::new(token)),
            max_attempts,
            throttle_pause,
        }
    }

    async fn with_throttle_retry<F, Fut, T>(&self, operation: F) -> Result<T, BotError>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, BotError>> + Send,
        T: Send,
    {
        retry_on_throttle(self.max_attempts, self.throttle_pause, operation).await
    }

    /// One raw Web API call, with throttling surfaced as its own error class.
    async fn call_web_api(&self, method: &str, payload: &Value) -> Result<Value, BotError> {
        let resp = HTTP_CLIENT
            .post(format!("https://slack.com/api/{method}"))
            .bearer_auth(&self.token.token_value.0)
            .json(payload)
            .send()
            .await
            .map_err(|e| BotError::Http(format!("{method} request failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BotError::Throttled(format!("{method}: HTTP 429")));
        }
        if !resp.status().is_success() {
            return Err(BotError::Api(format!("{method} HTTP {}", resp.status())));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| BotError::Api(format!("{method} JSON parse error: {e}")))?;

        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let code = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            if code == "ratelimited" || code == "rate_limited" {
                return Err(BotError::Throttled(format!("{method}: {code}")));
            }
            return Err(BotError::Api(format!("{method} error: {code}")));
        }

        Ok(body)
    }
}

#[async_trait]
impl Delivery for SlackClient {
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), BotError> {
        match thread_ts {
            None => {
                self.with_throttle_retry(|| async {
                    let session = SLACK_CLIENT
                        .as_ref()
                        .ok_or_else(|| {
                            BotError::Api("Slack HTTP connector not initialized".to_string())
                        })?
                        .open_session(&self.token);

                    let post_req = SlackApiChatPostMessageRequest::new(
                        SlackChannelId(channel_id.to_string()),
                        SlackMessageContent::new().with_text(text.to_string()),
                    );

                    session.chat_post_message(&post_req).await?;

                    Ok(())
                })
                .await
            }
            Some(ts) => {
                let payload = json!({
                    "channel": channel_id,
                    "text": text,
                    "thread_ts": ts,
                });

                self.with_throttle_retry(|| async {
                    self.call_web_api("chat.postMessage", &payload).await?;
                    Ok(())
                })
                .await
            }
        }
    }

    async fn update_message(
        &self,
        channel_id: &str,
        ts: &str,
        text: &str,
    ) -> Result<(), BotError> {
        let payload = json!({
            "channel": channel_id,
            "ts": ts,
            "text": text,
        });

        self.with_throttle_retry(|| async {
            self.call_web_api("chat.update", &payload).await?;
            Ok(())
        })
        .await
    }

    async fn post_webhook(&self, response_url: &str, text: &str) -> Result<(), BotError> {
        let payload = json!({
            "response_type": "ephemeral",
            "text": text,
        });

        self.with_throttle_retry(|| async {
            let resp = HTTP_CLIENT
                .post(response_url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| BotError::Http(format!("response_url POST failed: {e}")))?;

            if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(BotError::Throttled("response_url: HTTP 429".to_string()));
            }
            if !resp.status().is_success() {
                return Err(BotError::Api(format!(
                    "response_url HTTP {}",
                    resp.status()
                )));
            }

            Ok(())
        })
        .await
    }
}
