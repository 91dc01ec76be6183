//! Test doubles shared by the app-layer test modules.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{EngineError, Task, TaskId, Topic, Variables};
use crate::ports::LeaseClient;

#[derive(Debug, Clone)]
pub struct FailCall {
    pub task_id: TaskId,
    pub retries_remaining: u32,
    pub retry_timeout: Duration,
    pub error_message: String,
}

#[derive(Default)]
struct Recorded {
    claim_calls: u32,
    completes: Vec<(TaskId, Variables)>,
    fails: Vec<FailCall>,
    faults: Vec<(TaskId, String, String)>,
    extends: Vec<TaskId>,
}

#[derive(Default)]
struct Script {
    /// One entry consumed per `claim_batch` call; exhausted -> Ok(vec![]).
    claims: VecDeque<Result<Vec<Task>, EngineError>>,
    /// One entry consumed per `extend_lease` call; exhausted -> Ok(()).
    extends: VecDeque<Result<(), EngineError>>,
    /// One entry consumed per `complete` call; exhausted -> Ok(()).
    completes: VecDeque<Result<(), EngineError>>,
    /// One entry consumed per `fail` call; exhausted -> Ok(()).
    fails: VecDeque<Result<(), EngineError>>,
}

/// Scripted + recording engine double. Replies are popped from the script,
/// defaulting to success, and every call is recorded for assertions.
#[derive(Default)]
pub struct RecordingClient {
    script: Mutex<Script>,
    recorded: Mutex<Recorded>,
    claim_delay: Mutex<Duration>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `claim_batch` call take this long (simulates a slow or
    /// long-polling engine).
    pub fn set_claim_delay(&self, delay: Duration) {
        *self.claim_delay.lock().unwrap() = delay;
    }

    pub fn script_claim(&self, reply: Result<Vec<Task>, EngineError>) {
        self.script.lock().unwrap().claims.push_back(reply);
    }

    pub fn script_extend(&self, reply: Result<(), EngineError>) {
        self.script.lock().unwrap().extends.push_back(reply);
    }

    pub fn script_complete(&self, reply: Result<(), EngineError>) {
        self.script.lock().unwrap().completes.push_back(reply);
    }

    pub fn script_fail(&self, reply: Result<(), EngineError>) {
        self.script.lock().unwrap().fails.push_back(reply);
    }

    pub fn claim_calls(&self) -> u32 {
        self.recorded.lock().unwrap().claim_calls
    }

    pub fn completes(&self) -> Vec<(TaskId, Variables)> {
        self.recorded.lock().unwrap().completes.clone()
    }

    pub fn fails(&self) -> Vec<FailCall> {
        self.recorded.lock().unwrap().fails.clone()
    }

    pub fn faults(&self) -> Vec<(TaskId, String, String)> {
        self.recorded.lock().unwrap().faults.clone()
    }

    pub fn extends(&self) -> Vec<TaskId> {
        self.recorded.lock().unwrap().extends.clone()
    }
}

#[async_trait]
impl LeaseClient for RecordingClient {
    async fn claim_batch(
        &self,
        _topic: &Topic,
        _max_tasks: usize,
        _lock_duration: Duration,
    ) -> Result<Vec<Task>, EngineError> {
        let delay = *self.claim_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.recorded.lock().unwrap().claim_calls += 1;
        self.script
            .lock()
            .unwrap()
            .claims
            .pop_front()
            .unwrap_or(Ok(vec![]))
    }

    async fn extend_lease(
        &self,
        task_id: &TaskId,
        _new_duration: Duration,
    ) -> Result<(), EngineError> {
        self.recorded.lock().unwrap().extends.push(task_id.clone());
        self.script
            .lock()
            .unwrap()
            .extends
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn complete(&self, task_id: &TaskId, variables: Variables) -> Result<(), EngineError> {
        self.recorded
            .lock()
            .unwrap()
            .completes
            .push((task_id.clone(), variables));
        self.script
            .lock()
            .unwrap()
            .completes
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn fail(
        &self,
        task_id: &TaskId,
        retries_remaining: u32,
        retry_timeout: Duration,
        error_message: &str,
    ) -> Result<(), EngineError> {
        self.recorded.lock().unwrap().fails.push(FailCall {
            task_id: task_id.clone(),
            retries_remaining,
            retry_timeout,
            error_message: error_message.to_string(),
        });
        self.script
            .lock()
            .unwrap()
            .fails
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn report_business_fault(
        &self,
        task_id: &TaskId,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), EngineError> {
        self.recorded.lock().unwrap().faults.push((
            task_id.clone(),
            error_code.to_string(),
            error_message.to_string(),
        ));
        Ok(())
    }
}

/// A claimed task with sensible defaults for tests.
pub fn task(id: &str, topic: &str, retries_remaining: u32) -> Task {
    Task {
        id: TaskId::new(id),
        topic: Topic::new(topic),
        process_instance_id: format!("pi-{id}"),
        business_key: None,
        variables: Variables::new(),
        lock_expires_at: Utc::now() + chrono::Duration::seconds(30),
        retries_remaining,
        priority: None,
    }
}
