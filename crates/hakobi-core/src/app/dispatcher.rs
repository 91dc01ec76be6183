//! Dispatcher: bounded-concurrency execution of claimed tasks.
//!
//! Responsibilities:
//! - bound total concurrent handler executions via the shared slot table,
//! - guarantee at most one concurrent execution per task id,
//! - convert handler panics into retriable technical failures (handler code
//!   is never trusted to take the worker process down with it),
//! - report exactly one terminal outcome per attempt to the engine, or
//!   suppress it when the lease was lost mid-execution.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::config::TopicConfig;
use crate::domain::{EngineError, HandlerResult, RetryDecision, Task};
use crate::ports::LeaseClient;

use super::lease_keeper::LeaseKeeper;
use super::registry::HandlerRegistry;
use super::slots::{AcquireError, SlotTable};
use super::status::WorkerCounts;

pub struct Dispatcher {
    client: Arc<dyn LeaseClient>,
    registry: Arc<HandlerRegistry>,
    slots: Arc<SlotTable>,
    counts: Arc<WorkerCounts>,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn LeaseClient>,
        registry: Arc<HandlerRegistry>,
        slots: Arc<SlotTable>,
        counts: Arc<WorkerCounts>,
    ) -> Self {
        Self {
            client,
            registry,
            slots,
            counts,
        }
    }

    pub fn slots(&self) -> &Arc<SlotTable> {
        &self.slots
    }

    pub fn counts(&self) -> &Arc<WorkerCounts> {
        &self.counts
    }

    /// Take a slot for `task`, awaiting one if the pool is saturated; this
    /// wait is what throttles the poll loop. Starts execution in the
    /// background and returns once the slot is held and the task is running.
    ///
    /// The slot wait can last as long as the slowest in-flight handler, so
    /// it is raced against shutdown: when shutdown wins, the claim is handed
    /// back untouched instead of sitting on a lease nobody will work.
    pub async fn dispatch(
        self: &Arc<Self>,
        task: Task,
        cfg: Arc<TopicConfig>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let acquired = tokio::select! {
            acquired = self.slots.acquire(&task.id) => acquired,
            // The guard returned by `wait_for` is not `Send`; drop it inside
            // the branch future so the select arm can await while spawnable.
            _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => {
                self.release_unstarted(&task, "worker shutting down").await;
                return;
            }
        };

        match acquired {
            Ok(()) => {}
            Err(AcquireError::AlreadyInFlight) => {
                // The engine should never double-claim; release the extra
                // lease without touching the retry budget.
                warn!(
                    task_id = %task.id,
                    topic = %task.topic,
                    "task already in flight, releasing duplicate claim"
                );
                self.release_unstarted(&task, "duplicate claim for in-flight task")
                    .await;
                return;
            }
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_one(task, cfg).await;
        });
    }

    /// Hand a claimed-but-never-started task back to the engine, retries
    /// unchanged, so it is immediately reclaimable.
    pub async fn release_unstarted(&self, task: &Task, reason: &str) {
        let result = self
            .client
            .fail(
                &task.id,
                task.retries_remaining,
                std::time::Duration::ZERO,
                reason,
            )
            .await;
        if let Err(e) = result {
            warn!(task_id = %task.id, error = %e, "failed to release unstarted task");
        }
    }

    async fn run_one(self: Arc<Self>, task: Task, cfg: Arc<TopicConfig>) {
        let Some(handler) = self.registry.get(&task.topic) else {
            // Build-time validation makes this unreachable for subscribed
            // topics; keep the defensive path anyway.
            warn!(task_id = %task.id, topic = %task.topic, "no handler for claimed task");
            self.release_unstarted(&task, "no handler registered for topic")
                .await;
            self.slots.release(&task.id).await;
            return;
        };

        let keeper = LeaseKeeper::spawn(
            Arc::clone(&self.client),
            task.id.clone(),
            cfg.lock_duration,
            cfg.heartbeat_fraction,
            task.lock_expires_at,
        );

        // Run the handler in its own task so a panic surfaces as a JoinError
        // here instead of unwinding through the dispatcher.
        let input = task.input();
        let handler_join = tokio::spawn(async move { handler.handle_dyn(input).await });
        let result = match handler_join.await {
            Ok(result) => result,
            Err(e) => HandlerResult::technical_failure(panic_message(e)),
        };

        // Stop heartbeats before reporting; no extension may fire after the
        // terminal call.
        let orphaned = keeper.stop().await;

        if orphaned {
            // The lease-loss event was already logged by the keeper.
            debug!(task_id = %task.id, "suppressing terminal report for orphaned task");
            self.counts.incr_lease_lost();
        } else {
            self.report(&task, &cfg, result).await;
        }

        self.slots.release(&task.id).await;
    }

    async fn report(&self, task: &Task, cfg: &TopicConfig, result: HandlerResult) {
        match result {
            HandlerResult::Completed { variables } => {
                match self.client.complete(&task.id, variables).await {
                    Ok(()) => {
                        debug!(task_id = %task.id, topic = %task.topic, "task completed");
                        self.counts.incr_completed();
                    }
                    Err(EngineError::LeaseLost(_)) => {
                        // A prior attempt may have succeeded despite a lost
                        // response; treat as success-no-op.
                        debug!(task_id = %task.id, "complete raced a lost lease, dropping");
                        self.counts.incr_lease_lost();
                    }
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "failed to report completion");
                    }
                }
            }
            HandlerResult::BusinessFailure {
                error_code,
                error_message,
            } => {
                match self
                    .client
                    .report_business_fault(&task.id, &error_code, &error_message)
                    .await
                {
                    Ok(()) => {
                        debug!(task_id = %task.id, error_code, "business fault reported");
                        self.counts.incr_business_fault();
                    }
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "failed to report business fault");
                    }
                }
            }
            HandlerResult::TechnicalFailure {
                error_message,
                retriable,
            } => {
                let decision = if retriable {
                    cfg.retry_policy()
                        .decide(cfg.initial_retries, task.retries_remaining)
                } else {
                    RetryDecision {
                        retries_remaining: 0,
                        retry_timeout: std::time::Duration::ZERO,
                    }
                };

                if decision.is_terminal() {
                    // One last report so the engine records the real cause;
                    // from here the task needs external intervention.
                    warn!(
                        task_id = %task.id,
                        topic = %task.topic,
                        error = %error_message,
                        "task failed terminally, no retries left"
                    );
                } else {
                    warn!(
                        task_id = %task.id,
                        topic = %task.topic,
                        error = %error_message,
                        retries_remaining = decision.retries_remaining,
                        retry_in_ms = decision.retry_timeout.as_millis() as u64,
                        "task failed, retry scheduled"
                    );
                }

                match self
                    .client
                    .fail(
                        &task.id,
                        decision.retries_remaining,
                        decision.retry_timeout,
                        &error_message,
                    )
                    .await
                {
                    Ok(()) => self.counts.incr_failed(),
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "failed to report task failure");
                    }
                }
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        if let Some(s) = payload.downcast_ref::<&str>() {
            format!("handler panicked: {s}")
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("handler panicked: {s}")
        } else {
            "handler panicked".to_string()
        }
    } else {
        "handler task was cancelled".to_string()
    }
}
