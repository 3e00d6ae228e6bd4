//! Rate-limited Slack delivery.

pub mod client;

pub use client::{Delivery, SlackClient};
