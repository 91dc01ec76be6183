//! Error taxonomy.
//!
//! Design intent:
//! - `EngineError` covers the two conditions an engine call can end in that
//!   the core has to react to. Transport problems are recoverable and only
//!   ever trigger backoff; lease loss is a *signal* (another party owns the
//!   lease now), not an error to retry.
//! - `ConfigError` is fatal at startup and never retried.
//! - Handler-originated outcomes are not errors at all; they travel through
//!   `HandlerResult`.

use thiserror::Error;

use super::task::{TaskId, Topic};

/// Failure modes of a remote engine call.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network / 5xx class problem. Recoverable; the caller backs off and
    /// tries again. Never consumes a task retry.
    #[error("engine transport error: {0}")]
    Transport(String),

    /// The engine no longer recognises our lease on this task (expired and
    /// reclaimed, or already completed). Must not be retried blindly.
    #[error("lease lost for task {0}")]
    LeaseLost(TaskId),
}

impl EngineError {
    pub fn is_lease_lost(&self) -> bool {
        matches!(self, EngineError::LeaseLost(_))
    }
}

/// Invalid worker configuration, rejected before anything starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config for topic '{topic}': {reason}")]
    InvalidTopic { topic: Topic, reason: String },

    #[error("invalid worker settings: {0}")]
    InvalidSettings(String),

    /// A topic was subscribed but no handler is registered for it.
    /// Silent no-op dispatch would be worse than refusing to start.
    #[error("no handler registered for subscribed topic '{0}'")]
    MissingHandler(Topic),
}
