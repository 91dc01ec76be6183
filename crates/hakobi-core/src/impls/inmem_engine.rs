//! In-memory process engine, useful for demos and integration tests.
//!
//! Faithful to the remote contract where it matters for the worker side:
//! leases expire and are reclaimed, `fail` with a retry timeout makes the
//! task invisible until the timeout elapses, and per-task operations from a
//! holder whose lease was reclaimed answer with `LeaseLost`.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{EngineError, Task, TaskId, Topic, Variables, WorkerId};
use crate::ports::LeaseClient;

/// A task the engine knows about wearing its queue-side state.
#[derive(Debug, Clone)]
struct StoredTask {
    id: TaskId,
    topic: Topic,
    process_instance_id: String,
    business_key: Option<String>,
    variables: Variables,
    retries_remaining: u32,
    priority: Option<i64>,
    // retry timeout gate; task is claimable once `now >= available_at`
    available_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Lease {
    task: StoredTask,
    holder: WorkerId,
    expires_at: DateTime<Utc>,
}

/// A terminally reported task, kept for inspection.
#[derive(Debug, Clone)]
pub enum Disposition {
    Completed { variables: Variables },
    Exhausted { error_message: String },
    BusinessFault { error_code: String, error_message: String },
}

#[derive(Default)]
struct EngineState {
    queues: HashMap<Topic, VecDeque<StoredTask>>,
    leased: HashMap<TaskId, Lease>,
    finished: Vec<(TaskId, Disposition)>,
}

pub struct InMemoryEngine {
    state: Mutex<EngineState>,
    worker_id: WorkerId,
    next_seq: Mutex<u64>,
}

impl InMemoryEngine {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            worker_id,
            next_seq: Mutex::new(0),
        }
    }

    /// Enqueue a task and return its engine-assigned id.
    pub async fn seed(
        &self,
        topic: impl Into<String>,
        variables: Variables,
        retries: u32,
    ) -> TaskId {
        let id = {
            let mut seq = self.next_seq.lock().await;
            *seq += 1;
            TaskId::new(format!("task-{:04}", *seq))
        };
        let topic = Topic::new(topic);
        let task = StoredTask {
            id: id.clone(),
            topic: topic.clone(),
            process_instance_id: format!("proc-{}", id),
            business_key: None,
            variables,
            retries_remaining: retries,
            priority: None,
            available_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .queues
            .entry(topic)
            .or_default()
            .push_back(task);
        id
    }

    /// Drop a lease as if another party reclaimed it. The task goes back to
    /// its queue; the previous holder will see `LeaseLost` on its next
    /// per-task call.
    pub async fn revoke(&self, task_id: &TaskId) -> bool {
        let mut state = self.state.lock().await;
        match state.leased.remove(task_id) {
            Some(lease) => {
                let topic = lease.task.topic.clone();
                state.queues.entry(topic).or_default().push_back(lease.task);
                true
            }
            None => false,
        }
    }

    pub async fn finished(&self) -> Vec<(TaskId, Disposition)> {
        self.state.lock().await.finished.clone()
    }

    pub async fn queued(&self, topic: &Topic) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(topic)
            .map_or(0, |q| q.len())
    }

    pub async fn leased(&self) -> usize {
        self.state.lock().await.leased.len()
    }

    /// Move expired leases back to their queues.
    fn reclaim_expired(state: &mut EngineState, now: DateTime<Utc>) {
        let expired: Vec<TaskId> = state
            .leased
            .iter()
            .filter(|(_, l)| l.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(lease) = state.leased.remove(&id) {
                debug!(task_id = %id, "lease expired; requeueing");
                let topic = lease.task.topic.clone();
                state.queues.entry(topic).or_default().push_back(lease.task);
            }
        }
    }

    /// Take the lease out if this worker still holds it.
    fn take_lease(
        state: &mut EngineState,
        task_id: &TaskId,
        holder: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<Lease, EngineError> {
        Self::reclaim_expired(state, now);
        match state.leased.remove(task_id) {
            Some(lease) if &lease.holder == holder => Ok(lease),
            Some(lease) => {
                state.leased.insert(task_id.clone(), lease);
                Err(EngineError::LeaseLost(task_id.clone()))
            }
            None => Err(EngineError::LeaseLost(task_id.clone())),
        }
    }
}

#[async_trait]
impl LeaseClient for InMemoryEngine {
    async fn claim_batch(
        &self,
        topic: &Topic,
        max_tasks: usize,
        lock_duration: Duration,
    ) -> Result<Vec<Task>, EngineError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        Self::reclaim_expired(&mut state, now);

        let lock = chrono::Duration::from_std(lock_duration)
            .map_err(|e| EngineError::Transport(format!("lock duration out of range: {e}")))?;
        let expires_at = now + lock;

        let mut claimed = Vec::new();
        if let Some(queue) = state.queues.get_mut(topic) {
            let mut deferred = VecDeque::new();
            while claimed.len() < max_tasks {
                let Some(stored) = queue.pop_front() else { break };
                if stored.available_at > now {
                    deferred.push_back(stored);
                    continue;
                }
                claimed.push(stored);
            }
            // tasks still inside their retry timeout keep their queue position
            while let Some(stored) = deferred.pop_back() {
                queue.push_front(stored);
            }
        }

        let mut out = Vec::with_capacity(claimed.len());
        for stored in claimed {
            out.push(Task {
                id: stored.id.clone(),
                topic: stored.topic.clone(),
                process_instance_id: stored.process_instance_id.clone(),
                business_key: stored.business_key.clone(),
                variables: stored.variables.clone(),
                lock_expires_at: expires_at,
                retries_remaining: stored.retries_remaining,
                priority: stored.priority,
            });
            state.leased.insert(
                stored.id.clone(),
                Lease {
                    task: stored,
                    holder: self.worker_id.clone(),
                    expires_at,
                },
            );
        }
        Ok(out)
    }

    async fn extend_lease(
        &self,
        task_id: &TaskId,
        new_duration: Duration,
    ) -> Result<(), EngineError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let mut lease = Self::take_lease(&mut state, task_id, &self.worker_id, now)?;
        let lock = chrono::Duration::from_std(new_duration)
            .map_err(|e| EngineError::Transport(format!("lock duration out of range: {e}")))?;
        lease.expires_at = now + lock;
        state.leased.insert(task_id.clone(), lease);
        Ok(())
    }

    async fn complete(&self, task_id: &TaskId, variables: Variables) -> Result<(), EngineError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        Self::take_lease(&mut state, task_id, &self.worker_id, now)?;
        state
            .finished
            .push((task_id.clone(), Disposition::Completed { variables }));
        Ok(())
    }

    async fn fail(
        &self,
        task_id: &TaskId,
        retries_remaining: u32,
        retry_timeout: Duration,
        error_message: &str,
    ) -> Result<(), EngineError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let lease = Self::take_lease(&mut state, task_id, &self.worker_id, now)?;

        if retries_remaining == 0 {
            state.finished.push((
                task_id.clone(),
                Disposition::Exhausted {
                    error_message: error_message.to_string(),
                },
            ));
            return Ok(());
        }

        let mut stored = lease.task;
        stored.retries_remaining = retries_remaining;
        stored.available_at = now
            + chrono::Duration::from_std(retry_timeout)
                .map_err(|e| EngineError::Transport(format!("retry timeout out of range: {e}")))?;
        let topic = stored.topic.clone();
        state.queues.entry(topic).or_default().push_back(stored);
        Ok(())
    }

    async fn report_business_fault(
        &self,
        task_id: &TaskId,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), EngineError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        Self::take_lease(&mut state, task_id, &self.worker_id, now)?;
        state.finished.push((
            task_id.clone(),
            Disposition::BusinessFault {
                error_code: error_code.to_string(),
                error_message: error_message.to_string(),
            },
        ));
        Ok(())
    }
}
