use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis_url: String,
    pub slack_bot_token: String,
    pub engine_url: String,
    pub engine_api_key: Option<String>,
    pub admin_secret: String,
    pub streaming_enabled: bool,
    /// Minimum interval between in-place streaming updates.
    pub stream_update_interval_ms: u64,
    /// Smaller window used for the final flush after the stream ends.
    pub stream_final_flush_ms: u64,
    /// Total delivery attempts per Slack call (initial call included).
    pub delivery_max_attempts: u32,
    /// Pause between throttled retries, slightly above Slack's per-channel
    /// one-message-per-second floor.
    pub throttle_pause_ms: u64,
    pub dedupe_retention_secs: u64,
    pub queue_key_prefix: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            redis_url: env::var("REDIS_URL").map_err(|e| format!("REDIS_URL: {}", e))?,
            slack_bot_token: env::var("SLACK_BOT_TOKEN")
                .map_err(|e| format!("SLACK_BOT_TOKEN: {}", e))?,
            engine_url: env::var("ANSWER_ENGINE_URL")
                .map_err(|e| format!("ANSWER_ENGINE_URL: {}", e))?,
            engine_api_key: env::var("ANSWER_ENGINE_API_KEY").ok(),
            admin_secret: env::var("ADMIN_SHARED_SECRET")
                .map_err(|e| format!("ADMIN_SHARED_SECRET: {}", e))?,
            streaming_enabled: flag_var("STREAMING_ENABLED"),
            stream_update_interval_ms: numeric_var("STREAM_UPDATE_INTERVAL_MS", 2000)?,
            stream_final_flush_ms: numeric_var("STREAM_FINAL_FLUSH_MS", 1000)?,
            delivery_max_attempts: u32::try_from(numeric_var("DELIVERY_MAX_ATTEMPTS", 3)?)
                .map_err(|e| format!("DELIVERY_MAX_ATTEMPTS: {}", e))?,
            throttle_pause_ms: numeric_var("THROTTLE_PAUSE_MS", 1100)?,
            dedupe_retention_secs: numeric_var("DEDUPE_RETENTION_SECS", 3600)?,
            queue_key_prefix: env::var("QUEUE_KEY_PREFIX").ok(),
        })
    }
}

fn flag_var(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn numeric_var(name: &str, default: u64) -> Result<u64, String> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<u64>().map_err(|e| format!("{}: {}", name, e)),
        Err(_) => Ok(default),
    }
}
