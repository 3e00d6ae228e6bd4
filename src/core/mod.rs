//! Configuration and the queue data model.

pub mod config;
pub mod models;
