//! HTTP lease client for a remote process engine.
//!
//! Endpoint shapes (all POST, JSON bodies, durations in milliseconds):
//! - `/claim`         {workerId, topic, maxTasks, lockDuration} -> [Task]
//! - `/extend`        {taskId, workerId, newLockDuration}       -> 204
//! - `/complete`      {taskId, workerId, outputVariables}       -> 204
//! - `/fail`          {taskId, workerId, retriesRemaining, retryTimeout, errorMessage}
//! - `/businessFault` {taskId, workerId, errorCode, errorMessage}
//!
//! 404 and 409 on the per-task endpoints mean the lease is no longer ours
//! and map to `EngineError::LeaseLost`. Everything else non-2xx is a
//! transport error.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::domain::{EngineError, Task, TaskId, Topic, Variables, WorkerId};
use crate::ports::LeaseClient;

pub struct HttpLeaseClient {
    http: reqwest::Client,
    base_url: String,
    worker_id: WorkerId,
}

impl HttpLeaseClient {
    /// `base_url` without a trailing slash, e.g. `http://engine:8080/tasks`.
    pub fn new(
        base_url: impl Into<String>,
        worker_id: WorkerId,
        request_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| EngineError::Transport(format!("building http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            worker_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn post_expecting_204<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        task_id: &TaskId,
    ) -> Result<(), EngineError> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Transport(format!("{path}: {e}")))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::CONFLICT => {
                Err(EngineError::LeaseLost(task_id.clone()))
            }
            s => Err(EngineError::Transport(format!("{path}: engine returned {s}"))),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimRequest<'a> {
    worker_id: &'a WorkerId,
    topic: &'a Topic,
    max_tasks: usize,
    lock_duration: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimedTask {
    id: TaskId,
    #[serde(default)]
    variables: Variables,
    lock_expires_at: DateTime<Utc>,
    retries_remaining: u32,
    process_instance_id: String,
    #[serde(default)]
    business_key: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtendRequest<'a> {
    task_id: &'a TaskId,
    worker_id: &'a WorkerId,
    new_lock_duration: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest<'a> {
    task_id: &'a TaskId,
    worker_id: &'a WorkerId,
    output_variables: &'a Variables,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailRequest<'a> {
    task_id: &'a TaskId,
    worker_id: &'a WorkerId,
    retries_remaining: u32,
    retry_timeout: u64,
    error_message: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BusinessFaultRequest<'a> {
    task_id: &'a TaskId,
    worker_id: &'a WorkerId,
    error_code: &'a str,
    error_message: &'a str,
}

#[async_trait]
impl LeaseClient for HttpLeaseClient {
    async fn claim_batch(
        &self,
        topic: &Topic,
        max_tasks: usize,
        lock_duration: Duration,
    ) -> Result<Vec<Task>, EngineError> {
        let body = ClaimRequest {
            worker_id: &self.worker_id,
            topic,
            max_tasks,
            lock_duration: lock_duration.as_millis() as u64,
        };
        let resp = self
            .http
            .post(self.url("claim"))
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Transport(format!("claim: {e}")))?;

        if !resp.status().is_success() {
            return Err(EngineError::Transport(format!(
                "claim: engine returned {}",
                resp.status()
            )));
        }

        let claimed: Vec<ClaimedTask> = resp
            .json()
            .await
            .map_err(|e| EngineError::Transport(format!("claim: decoding response: {e}")))?;

        Ok(claimed
            .into_iter()
            .map(|c| Task {
                id: c.id,
                topic: topic.clone(),
                process_instance_id: c.process_instance_id,
                business_key: c.business_key,
                variables: c.variables,
                lock_expires_at: c.lock_expires_at,
                retries_remaining: c.retries_remaining,
                priority: c.priority,
            })
            .collect())
    }

    async fn extend_lease(
        &self,
        task_id: &TaskId,
        new_duration: Duration,
    ) -> Result<(), EngineError> {
        let body = ExtendRequest {
            task_id,
            worker_id: &self.worker_id,
            new_lock_duration: new_duration.as_millis() as u64,
        };
        self.post_expecting_204("extend", &body, task_id).await
    }

    async fn complete(&self, task_id: &TaskId, variables: Variables) -> Result<(), EngineError> {
        let body = CompleteRequest {
            task_id,
            worker_id: &self.worker_id,
            output_variables: &variables,
        };
        self.post_expecting_204("complete", &body, task_id).await
    }

    async fn fail(
        &self,
        task_id: &TaskId,
        retries_remaining: u32,
        retry_timeout: Duration,
        error_message: &str,
    ) -> Result<(), EngineError> {
        let body = FailRequest {
            task_id,
            worker_id: &self.worker_id,
            retries_remaining,
            retry_timeout: retry_timeout.as_millis() as u64,
            error_message,
        };
        self.post_expecting_204("fail", &body, task_id).await
    }

    async fn report_business_fault(
        &self,
        task_id: &TaskId,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), EngineError> {
        let body = BusinessFaultRequest {
            task_id,
            worker_id: &self.worker_id,
            error_code,
            error_message,
        };
        self.post_expecting_204("businessFault", &body, task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_request_serialises_camel_case_millis() {
        let worker_id = WorkerId::new("w-1");
        let topic = Topic::new("ingest");
        let body = ClaimRequest {
            worker_id: &worker_id,
            topic: &topic,
            max_tasks: 5,
            lock_duration: Duration::from_secs(30).as_millis() as u64,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["workerId"], "w-1");
        assert_eq!(json["topic"], "ingest");
        assert_eq!(json["maxTasks"], 5);
        assert_eq!(json["lockDuration"], 30_000);
    }

    #[test]
    fn claimed_task_decodes_with_optional_fields_missing() {
        let raw = r#"{
            "id": "t-1",
            "lockExpiresAt": "2026-01-01T00:00:30Z",
            "retriesRemaining": 3,
            "processInstanceId": "pi-9"
        }"#;
        let c: ClaimedTask = serde_json::from_str(raw).unwrap();
        assert_eq!(c.id, TaskId::new("t-1"));
        assert_eq!(c.retries_remaining, 3);
        assert!(c.business_key.is_none());
        assert!(c.priority.is_none());
        assert!(c.variables.is_empty());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client =
            HttpLeaseClient::new("http://engine/tasks/", WorkerId::new("w"), Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.url("claim"), "http://engine/tasks/claim");
    }
}
