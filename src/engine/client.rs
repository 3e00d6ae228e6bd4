//! HTTP client for the answer engine.
//!
//! Two consumption modes: a single blocking `generate` call that returns the
//! final answer text, and `open_stream`, which yields content snapshots as
//! the engine assembles the answer. The stream is a single logical answer
//! built incrementally; it is not restartable.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::sse::{ParseResult, SseParser, StreamEvent};
use crate::errors::BotError;

static HTTP_CLIENT: std::sync::LazyLock<Client> = std::sync::LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .unwrap_or_else(|_| Client::new())
});

#[derive(Debug, Deserialize)]
struct AnswerResponse {
    answer: String,
}

#[async_trait]
pub trait AnswerEngine: Send + Sync {
    /// Generate the full answer for a question.
    async fn generate(&self, question: &str) -> Result<String, BotError>;

    /// Open a snapshot stream for a question.
    async fn open_stream(&self, question: &str) -> Result<Box<dyn AnswerStream>, BotError>;
}

/// A lazy, finite sequence of content snapshots.
#[async_trait]
pub trait AnswerStream: Send {
    /// The next snapshot, or `None` once the answer is final.
    async fn next_chunk(&mut self) -> Result<Option<String>, BotError>;
}

/// Production engine client.
pub struct HttpAnswerEngine {
    base_url: String,
    api_key: Option<String>,
}

impl HttpAnswerEngine {
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self { base_url, api_key }
    }

    fn request(&self, accept: &str, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let mut builder = HTTP_CLIENT
            .post(&self.base_url)
            .header(reqwest::header::ACCEPT, accept)
            .json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl AnswerEngine for HttpAnswerEngine {
    async fn generate(&self, question: &str) -> Result<String, BotError> {
        let body = json!({ "question": question });
        let resp = self
            .request("application/json", &body)
            .send()
            .await
            .map_err(|e| BotError::Generation(format!("engine request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(BotError::Generation(format!(
                "engine HTTP {}",
                resp.status()
            )));
        }

        let answer: AnswerResponse = resp
            .json()
            .await
            .map_err(|e| BotError::Generation(format!("engine response parse error: {e}")))?;

        if answer.answer.trim().is_empty() {
            return Err(BotError::Generation("engine returned an empty answer".to_string()));
        }

        Ok(answer.answer)
    }

    async fn open_stream(&self, question: &str) -> Result<Box<dyn AnswerStream>, BotError> {
        let body = json!({ "question": question, "stream": true });
        let resp = self
            .request("text/event-stream", &body)
            .send()
            .await
            .map_err(|e| BotError::Generation(format!("engine stream request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(BotError::Generation(format!(
                "engine stream HTTP {}",
                resp.status()
            )));
        }

        Ok(Box::new(SseAnswerStream {
            byte_stream: Box::pin(resp.bytes_stream()),
            parser: SseParser::new(),
            pending: VecDeque::new(),
            utf8_buffer: Vec::new(),
            saw_any_content: false,
            completed: false,
        }))
    }
}

/// Type alias for the boxed byte stream.
type ByteStream = Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

struct SseAnswerStream {
    byte_stream: ByteStream,
    parser: SseParser,
    pending: VecDeque<ParseResult>,
    /// Carries an incomplete trailing UTF-8 sequence across chunk boundaries.
    utf8_buffer: Vec<u8>,
    saw_any_content: bool,
    completed: bool,
}

impl SseAnswerStream {
    fn drain_pending(&mut self) -> Result<Option<String>, BotError> {
        while let Some(result) = self.pending.pop_front() {
            match result {
                ParseResult::Event(StreamEvent::Update(text)) => {
                    if !text.is_empty() {
                        self.saw_any_content = true;
                    }
                    return Ok(Some(text));
                }
                ParseResult::Event(StreamEvent::Completed) => {
                    self.completed = true;
                    return Ok(None);
                }
                ParseResult::Event(StreamEvent::Failed(message)) => {
                    self.completed = true;
                    return Err(BotError::Generation(message));
                }
                ParseResult::Done => {
                    self.completed = true;
                    if self.saw_any_content {
                        // Proxies sometimes close with [DONE] and no
                        // answer.completed; usable content wins.
                        warn!("engine stream ended with [DONE] before answer.completed");
                        return Ok(None);
                    }
                    return Err(BotError::Generation(
                        "engine stream ended before any content".to_string(),
                    ));
                }
                ParseResult::UnknownEvent(event_type) => {
                    debug!(event_type = %event_type, "Ignoring engine SSE event");
                }
            }
        }
        Ok(None)
    }

    fn feed_bytes(&mut self, bytes: &[u8]) -> Result<(), BotError> {
        // Preserve UTF-8 correctness across arbitrary chunk boundaries.
        self.utf8_buffer.extend_from_slice(bytes);
        match std::str::from_utf8(&self.utf8_buffer) {
            Ok(valid) => {
                let results = self.parser.feed(valid);
                self.pending.extend(results);
                self.utf8_buffer.clear();
                Ok(())
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                if valid_up_to > 0 {
                    let valid = std::str::from_utf8(&self.utf8_buffer[..valid_up_to])
                        .map_err(|e| BotError::Generation(format!("invalid UTF-8: {e}")))?
                        .to_string();
                    let results = self.parser.feed(&valid);
                    self.pending.extend(results);
                    self.utf8_buffer.drain(..valid_up_to);
                }
                if e.error_len().is_some() {
                    self.completed = true;
                    return Err(BotError::Generation(
                        "invalid UTF-8 in engine stream".to_string(),
                    ));
                }
                // Incomplete trailing sequence; wait for more bytes.
                Ok(())
            }
        }
    }
}

#[async_trait]
impl AnswerStream for SseAnswerStream {
    async fn next_chunk(&mut self) -> Result<Option<String>, BotError> {
        loop {
            // Drain already-parsed frames first; a single HTTP chunk can
            // carry several of them.
            if let Some(text) = self.drain_pending()? {
                return Ok(Some(text));
            }
            if self.completed {
                return Ok(None);
            }

            match self.byte_stream.next().await {
                Some(Ok(bytes)) => self.feed_bytes(&bytes)?,
                Some(Err(e)) => {
                    self.completed = true;
                    return Err(BotError::Generation(format!(
                        "error reading engine stream: {e}"
                    )));
                }
                None => {
                    self.completed = true;
                    if self.saw_any_content {
                        warn!("engine stream closed without answer.completed");
                        return Ok(None);
                    }
                    return Err(BotError::Generation(
                        "engine stream closed before any content".to_string(),
                    ));
                }
            }
        }
    }
}
