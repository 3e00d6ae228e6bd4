use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::BotError;

/// Slack conversation kind, as reported by the Events API.
///
/// Governs threading: direct conversations (`im`/`mpim`) are never threaded,
/// even when the inbound event carried a `thread_ts`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    #[default]
    Channel,
    Group,
    Im,
    Mpim,
}

/// One question-to-answer unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub channel_type: ChannelType,
    /// Timestamp of an already-posted "thinking…" message to edit in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder_ts: Option<String>,
    /// Platform event timestamp; basis of idempotency when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_ts: Option<String>,
    #[serde(default)]
    pub use_streaming: bool,
}

impl Job {
    /// Reject jobs that cannot be delivered anywhere.
    ///
    /// # Errors
    ///
    /// Returns `BotError::Validation` if the question is empty or the job
    /// names neither a channel nor a response URL.
    pub fn validate(&self) -> Result<(), BotError> {
        if self.question_text.trim().is_empty() {
            return Err(BotError::Validation("question_text is empty".to_string()));
        }
        if self.channel_id.is_none() && self.response_url.is_none() {
            return Err(BotError::Validation(
                "job has neither channel_id nor response_url".to_string(),
            ));
        }
        Ok(())
    }

    /// Thread to reply into, with threading suppressed for direct
    /// conversations.
    #[must_use]
    pub fn reply_thread(&self) -> Option<&str> {
        match self.channel_type {
            ChannelType::Im | ChannelType::Mpim => None,
            ChannelType::Channel | ChannelType::Group => self.thread_ts.as_deref(),
        }
    }
}

/// Persisted form of a queued job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub body: Job,
    #[serde(default = "Utc::now")]
    pub enqueued_at: DateTime<Utc>,
}

impl Envelope {
    #[must_use]
    pub fn new(body: Job) -> Self {
        Self {
            body,
            enqueued_at: Utc::now(),
        }
    }
}

/// A failed job parked on the `dead` list with its error context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub stream_id: String,
    pub body: Job,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl DeadLetterEntry {
    #[must_use]
    pub fn new(body: Job, error: String) -> Self {
        Self {
            stream_id: uuid::Uuid::new_v4().to_string(),
            body,
            error,
            timestamp: Utc::now(),
        }
    }
}

/// Inbound job shape: either a bare [`Job`] or an [`Envelope`] wrapping one.
///
/// Decoded once at the queue boundary; anything that fits neither shape is a
/// deserialization error surfaced to the caller.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum JobPayload {
    Wrapped(Envelope),
    Bare(Job),
}

impl JobPayload {
    #[must_use]
    pub fn into_envelope(self) -> Envelope {
        match self {
            JobPayload::Wrapped(envelope) => envelope,
            JobPayload::Bare(job) => Envelope::new(job),
        }
    }

    #[must_use]
    pub fn into_job(self) -> Job {
        self.into_envelope().body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel_job() -> Job {
        Job {
            question_text: "What is the deploy cadence?".to_string(),
            channel_id: Some("C024BE91L".to_string()),
            response_url: None,
            thread_ts: None,
            channel_type: ChannelType::Channel,
            placeholder_ts: None,
            event_ts: Some("1712345678.000100".to_string()),
            use_streaming: false,
        }
    }

    #[test]
    fn job_without_destination_is_invalid() {
        let mut job = channel_job();
        job.channel_id = None;
        assert!(matches!(job.validate(), Err(BotError::Validation(_))));

        job.response_url = Some("https://hooks.slack.com/commands/T1/1/abc".to_string());
        assert!(job.validate().is_ok());
    }

    #[test]
    fn empty_question_is_invalid() {
        let mut job = channel_job();
        job.question_text = "   ".to_string();
        assert!(matches!(job.validate(), Err(BotError::Validation(_))));
    }

    #[test]
    fn thread_suppressed_for_direct_conversations() {
        let mut job = channel_job();
        job.thread_ts = Some("1712345678.000200".to_string());

        job.channel_type = ChannelType::Channel;
        assert_eq!(job.reply_thread(), Some("1712345678.000200"));

        job.channel_type = ChannelType::Im;
        assert_eq!(job.reply_thread(), None);

        job.channel_type = ChannelType::Mpim;
        assert_eq!(job.reply_thread(), None);
    }

    #[test]
    fn payload_decodes_bare_job() {
        let value = json!({
            "question_text": "What is X?",
            "channel_id": "C1",
            "event_ts": "100.1"
        });
        let payload: JobPayload = serde_json::from_value(value).unwrap();
        let job = payload.into_job();
        assert_eq!(job.question_text, "What is X?");
        assert_eq!(job.channel_id.as_deref(), Some("C1"));
    }

    #[test]
    fn payload_decodes_wrapped_envelope() {
        let value = json!({
            "body": {
                "question_text": "What is X?",
                "channel_id": "C1"
            },
            "enqueued_at": "2024-04-05T12:00:00Z"
        });
        let payload: JobPayload = serde_json::from_value(value).unwrap();
        let envelope = payload.into_envelope();
        assert_eq!(envelope.body.question_text, "What is X?");
        assert_eq!(envelope.enqueued_at.timestamp(), 1_712_318_400);
    }

    #[test]
    fn payload_rejects_unrecognized_shape() {
        let value = json!({ "text": "not a job" });
        assert!(serde_json::from_value::<JobPayload>(value).is_err());
    }

    #[test]
    fn channel_type_uses_slack_names() {
        assert_eq!(serde_json::to_string(&ChannelType::Mpim).unwrap(), "\"mpim\"");
        let parsed: ChannelType = serde_json::from_str("\"im\"").unwrap();
        assert_eq!(parsed, ChannelType::Im);
    }
}
