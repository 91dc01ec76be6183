//! LeaseClient port: claim / extend / report against the remote engine.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{EngineError, Task, TaskId, Topic, Variables};

/// The five remote operations the core consumes. Owns no concurrency; every
/// method is one request/response exchange.
///
/// Idempotence contract: a prior attempt may have succeeded even though its
/// response was lost, so callers treat `LeaseLost` from `complete` and
/// `extend_lease` as success-no-op *at those call sites only*. Lease loss on
/// the failure-reporting calls is logged instead. That policy lives with the
/// callers (dispatcher / lease keeper), not here.
#[async_trait]
pub trait LeaseClient: Send + Sync {
    /// Claim up to `max_tasks` tasks of `topic`, locking each for
    /// `lock_duration`. The engine is expected to truncate; the poll loop
    /// still validates the returned count defensively.
    async fn claim_batch(
        &self,
        topic: &Topic,
        max_tasks: usize,
        lock_duration: Duration,
    ) -> Result<Vec<Task>, EngineError>;

    /// Prolong our lease on a task whose handler is still running.
    async fn extend_lease(
        &self,
        task_id: &TaskId,
        new_duration: Duration,
    ) -> Result<(), EngineError>;

    /// Report success, handing `variables` back to the process.
    async fn complete(&self, task_id: &TaskId, variables: Variables) -> Result<(), EngineError>;

    /// Report a technical failure. `retries_remaining == 0` makes the task
    /// terminal on the engine side; otherwise it becomes claimable again
    /// after `retry_timeout`.
    async fn fail(
        &self,
        task_id: &TaskId,
        retries_remaining: u32,
        retry_timeout: Duration,
        error_message: &str,
    ) -> Result<(), EngineError>;

    /// Report a modeled business fault (does not consume a retry).
    async fn report_business_fault(
        &self,
        task_id: &TaskId,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), EngineError>;
}
