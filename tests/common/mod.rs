//! Shared test doubles for the delivery and engine seams.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use lore::engine::{AnswerEngine, AnswerStream};
use lore::errors::BotError;
use lore::slack::Delivery;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryCall {
    Post {
        channel_id: String,
        text: String,
        thread_ts: Option<String>,
    },
    Update {
        channel_id: String,
        ts: String,
        text: String,
    },
    Webhook {
        response_url: String,
        text: String,
    },
}

/// Records every outbound call; optionally fails selected operations.
#[derive(Default)]
pub struct RecordingDelivery {
    pub calls: Mutex<Vec<DeliveryCall>>,
    pub fail_posts: bool,
    pub fail_updates: bool,
    pub fail_webhooks: bool,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<DeliveryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<DeliveryCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, DeliveryCall::Update { .. }))
            .collect()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<(), BotError> {
        self.calls.lock().unwrap().push(DeliveryCall::Post {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
            thread_ts: thread_ts.map(str::to_string),
        });
        if self.fail_posts {
            return Err(BotError::Api("chat.postMessage error: channel_not_found".to_string()));
        }
        Ok(())
    }

    async fn update_message(
        &self,
        channel_id: &str,
        ts: &str,
        text: &str,
    ) -> Result<(), BotError> {
        self.calls.lock().unwrap().push(DeliveryCall::Update {
            channel_id: channel_id.to_string(),
            ts: ts.to_string(),
            text: text.to_string(),
        });
        if self.fail_updates {
            return Err(BotError::Api("chat.update error: message_not_found".to_string()));
        }
        Ok(())
    }

    async fn post_webhook(&self, response_url: &str, text: &str) -> Result<(), BotError> {
        self.calls.lock().unwrap().push(DeliveryCall::Webhook {
            response_url: response_url.to_string(),
            text: text.to_string(),
        });
        if self.fail_webhooks {
            return Err(BotError::Api("response_url HTTP 410".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum ChunkStep {
    Snapshot(String),
    Fail(String),
}

/// Engine double with a fixed answer and a scripted snapshot stream.
pub struct ScriptedEngine {
    pub answer: Result<String, String>,
    pub chunks: Vec<ChunkStep>,
    /// Simulated inter-chunk arrival delay.
    pub chunk_interval: Duration,
}

impl ScriptedEngine {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            chunks: Vec::new(),
            chunk_interval: Duration::ZERO,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            chunks: Vec::new(),
            chunk_interval: Duration::ZERO,
        }
    }

    pub fn streaming(chunks: Vec<ChunkStep>, chunk_interval: Duration) -> Self {
        Self {
            answer: Err("streaming engine double".to_string()),
            chunks,
            chunk_interval,
        }
    }
}

#[async_trait]
impl AnswerEngine for ScriptedEngine {
    async fn generate(&self, _question: &str) -> Result<String, BotError> {
        self.answer.clone().map_err(BotError::Generation)
    }

    async fn open_stream(&self, _question: &str) -> Result<Box<dyn AnswerStream>, BotError> {
        Ok(Box::new(ScriptedStream {
            steps: self.chunks.clone().into(),
            interval: self.chunk_interval,
        }))
    }
}

pub struct ScriptedStream {
    steps: VecDeque<ChunkStep>,
    interval: Duration,
}

#[async_trait]
impl AnswerStream for ScriptedStream {
    async fn next_chunk(&mut self) -> Result<Option<String>, BotError> {
        let Some(step) = self.steps.pop_front() else {
            return Ok(None);
        };
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        match step {
            ChunkStep::Snapshot(text) => Ok(Some(text)),
            ChunkStep::Fail(message) => Err(BotError::Generation(message)),
        }
    }
}
