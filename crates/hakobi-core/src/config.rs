//! Worker configuration with fail-fast validation.
//!
//! Configuration problems are the only fatal startup errors in this crate;
//! everything that can go wrong later (transport, lease loss, handler
//! failures) is handled inside the loops. So `validate()` is deliberately
//! strict: a worker that would spin on a zero poll interval or never
//! heartbeat is refused before it starts.

use std::time::Duration;

use crate::domain::{ConfigError, RetryPolicy, Topic, WorkerId};

/// Static per-topic configuration.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    /// How long each claim locks a task for this worker.
    pub lock_duration: Duration,

    /// Upper bound on tasks per claim call.
    pub max_tasks_per_poll: usize,

    /// Idle delay after an empty claim (avoids hot-looping on an empty queue).
    pub poll_interval: Duration,

    /// Extend the lease when this fraction of its duration remains.
    /// Must lie strictly inside (0, 1); 0.5 means "extend at half-life".
    pub heartbeat_fraction: f64,

    /// Retry budget granted to tasks of this topic.
    pub initial_retries: u32,

    /// Backoff curve for task retries and for transport-error polling.
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            lock_duration: Duration::from_secs(30),
            max_tasks_per_poll: 10,
            poll_interval: Duration::from_millis(1500),
            heartbeat_fraction: 0.5,
            initial_retries: 3,
            base_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

impl TopicConfig {
    pub fn validate(&self, topic: &Topic) -> Result<(), ConfigError> {
        let fail = |reason: &str| {
            Err(ConfigError::InvalidTopic {
                topic: topic.clone(),
                reason: reason.to_string(),
            })
        };

        if self.lock_duration.is_zero() {
            return fail("lock_duration must be greater than zero");
        }
        if self.max_tasks_per_poll == 0 {
            return fail("max_tasks_per_poll must be greater than zero");
        }
        if self.poll_interval.is_zero() {
            return fail("poll_interval must be greater than zero");
        }
        if !(self.heartbeat_fraction > 0.0 && self.heartbeat_fraction < 1.0) {
            return fail("heartbeat_fraction must lie strictly between 0 and 1");
        }
        if self.base_retry_delay.is_zero() {
            return fail("base_retry_delay must be greater than zero");
        }
        if self.max_retry_delay < self.base_retry_delay {
            return fail("max_retry_delay must not be smaller than base_retry_delay");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.base_retry_delay, self.max_retry_delay)
    }
}

/// Worker-wide settings. The concurrency pool is shared across all topics.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_id: WorkerId,

    /// Total concurrent handler executions across all topics.
    pub max_concurrency: usize,

    /// How long shutdown waits for in-flight handlers before giving up on
    /// them (their leases then expire naturally and another worker reclaims).
    pub shutdown_grace: Duration,
}

impl WorkerSettings {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: WorkerId::new(worker_id),
            max_concurrency: 10,
            shutdown_grace: Duration::from_secs(30),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_id.as_str().is_empty() {
            return Err(ConfigError::InvalidSettings(
                "worker_id must not be empty".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidSettings(
                "max_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
