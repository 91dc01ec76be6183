//! Task model: identifiers and the claimed-task record.
//!
//! IDs here are assigned by the remote engine and treated as opaque strings.
//! We still wrap them in newtypes so a `TaskId` and a `WorkerId` cannot be
//! mixed up at compile time (same intent as typed IDs elsewhere, minus the
//! local generation, which we do not need).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::variables::Variables;

/// Opaque task identifier, assigned by the remote engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of this worker instance, sent with every engine call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Routing key selecting which handler processes a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One unit of claimed work, as returned by the engine's claim call.
///
/// The engine is the system of record; this object lives only for the
/// duration of one attempt by this worker and is forgotten the instant a
/// terminal outcome (or lease loss) is observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub topic: Topic,

    /// Correlation identifiers, passed through unmodified.
    pub process_instance_id: String,
    pub business_key: Option<String>,

    /// Handler input.
    pub variables: Variables,

    /// The lease is invalid at or after this instant.
    pub lock_expires_at: DateTime<Utc>,

    /// Decremented by the engine on each retriable technical failure.
    /// A task failing again at 0 is terminal.
    pub retries_remaining: u32,

    /// Advisory ordering hint, never interpreted locally.
    pub priority: Option<i64>,
}

impl Task {
    /// Handler-facing view of this task. Handlers never see lease state.
    pub fn input(&self) -> TaskInput {
        TaskInput {
            id: self.id.clone(),
            topic: self.topic.clone(),
            variables: self.variables.clone(),
            process_instance_id: self.process_instance_id.clone(),
            business_key: self.business_key.clone(),
        }
    }
}

/// What a handler gets to see: input data and correlation ids only.
///
/// Handlers must be safe to invoke concurrently across different tasks and
/// must not assume access to any worker-internal state.
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub id: TaskId,
    pub topic: Topic,
    pub variables: Variables,
    pub process_instance_id: String,
    pub business_key: Option<String>,
}
