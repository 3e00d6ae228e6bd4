//! The answer-generation engine boundary.
//!
//! The engine (embedding, retrieval, text generation) is an external service;
//! this crate consumes it through [`AnswerEngine`] as a single blocking call
//! or as a stream of content snapshots.

pub mod client;
pub mod sse;

pub use client::{AnswerEngine, AnswerStream, HttpAnswerEngine};

/// Snapshot the engine emits while retrieval is still in flight. Not real
/// content; the streaming throttler must never deliver it.
pub const KEEPALIVE_TEXT: &str = "_Still working on it..._";
