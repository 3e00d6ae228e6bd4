//! Worker Lambda handler and job dispatch.

pub mod dispatch;
pub mod handler;
pub mod streaming;

pub use dispatch::{DispatchMode, DispatchReport, DispatchSettings, DispatchStatus, Dispatcher};
pub use handler::handler;

/// Canonical failure message shown to users when answer generation or
/// delivery fails.
pub const ANSWER_FAILURE_MESSAGE: &str =
    ":warning: Sorry, I couldn't come up with an answer this time. Please try asking again later.";
