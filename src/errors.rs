use slack_morphism::errors::SlackClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Invalid job: {0}")]
    Validation(String),

    #[error("Delivery throttled by Slack: {0}")]
    Throttled(String),

    #[error("Failed to access Slack API: {0}")]
    Api(String),

    #[error("Failed to send HTTP request: {0}")]
    Http(String),

    #[error("Answer engine failure: {0}")]
    Generation(String),

    #[error("Queue store failure: {0}")]
    Store(String),
}

impl BotError {
    /// True for the one error class the delivery client is allowed to retry.
    #[must_use]
    pub const fn is_throttle(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

impl From<SlackClientError> for BotError {
    fn from(error: SlackClientError) -> Self {
        match error {
            SlackClientError::RateLimitError(e) => BotError::Throttled(e.to_string()),
            other => BotError::Api(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(error: reqwest::Error) -> Self {
        BotError::Http(error.to_string())
    }
}

impl From<redis::RedisError> for BotError {
    fn from(error: redis::RedisError) -> Self {
        BotError::Store(error.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(error: serde_json::Error) -> Self {
        BotError::Store(format!("queue payload serialization: {error}"))
    }
}

impl From<anyhow::Error> for BotError {
    fn from(error: anyhow::Error) -> Self {
        BotError::Api(error.to_string())
    }
}
