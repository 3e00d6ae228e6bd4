//! Server-Sent Events parser for the answer engine's streaming endpoint.
//!
//! Handles frames split across TCP chunks, multiple frames in one read, and
//! unknown event types (safely ignored).
//!
//! The engine emits JSON events of the form `{"type": "...", ...}`:
//! - `answer.update`: the latest full content snapshot in `text`
//! - `answer.completed`: the answer is final
//! - `answer.failed`: generation failed, message in `message`
//! and terminates the stream with a `[DONE]` sentinel.

use serde_json::Value;

/// Events emitted by the engine's streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The latest content snapshot.
    Update(String),
    /// Generation completed successfully.
    Completed,
    /// Generation failed with an error message.
    Failed(String),
}

/// Result of parsing one SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    Event(StreamEvent),
    /// The frame was parsed but carried an unhandled event type.
    UnknownEvent(String),
    /// End of stream signal (`[DONE]`).
    Done,
}

/// Stateful SSE parser that buffers incomplete frames across chunk boundaries.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Feeds a chunk of data to the parser and returns all complete events.
    pub fn feed(&mut self, chunk: &str) -> Vec<ParseResult> {
        self.buffer.push_str(chunk);
        let mut results = Vec::new();

        while let Some(frame_end) = self.find_frame_boundary() {
            let frame = self.buffer[..frame_end].to_string();
            self.buffer = self.buffer[frame_end..]
                .trim_start_matches('\n')
                .to_string();

            if let Some(result) = Self::parse_frame(&frame) {
                results.push(result);
            }
        }

        results
    }

    /// SSE frames end at a double newline.
    fn find_frame_boundary(&self) -> Option<usize> {
        if let Some(pos) = self.buffer.find("\n\n") {
            return Some(pos + 2);
        }
        if let Some(pos) = self.buffer.find("\r\n\r\n") {
            return Some(pos + 4);
        }
        None
    }

    fn parse_frame(frame: &str) -> Option<ParseResult> {
        let mut data_lines: Vec<&str> = Vec::new();

        for line in frame.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data);
                }
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        let data = data_lines.join("\n");

        if data == "[DONE]" {
            return Some(ParseResult::Done);
        }

        Self::parse_json_event(&data)
    }

    fn parse_json_event(data: &str) -> Option<ParseResult> {
        let json: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(_) => return None,
        };

        let event_type = json.get("type").and_then(Value::as_str).unwrap_or("");

        match event_type {
            "answer.update" => {
                let text = json.get("text").and_then(Value::as_str).unwrap_or("");
                Some(ParseResult::Event(StreamEvent::Update(text.to_string())))
            }
            "answer.completed" => Some(ParseResult::Event(StreamEvent::Completed)),
            "answer.failed" => {
                let message = json
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("engine reported failure without a message");
                Some(ParseResult::Event(StreamEvent::Failed(message.to_string())))
            }
            other => Some(ParseResult::UnknownEvent(other.to_string())),
        }
    }
}
