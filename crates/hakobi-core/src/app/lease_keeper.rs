//! Lease keeper: per-task heartbeat timer.
//!
//! While a handler runs, one keeper task sleeps until the lease has only
//! `heartbeat_fraction` of its duration left, extends it, and reschedules.
//! A lost lease flips the shared `orphaned` flag so the dispatcher can
//! suppress the terminal report (another worker owns the task now, and a
//! late `complete`/`fail` from us would double-report).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{EngineError, TaskId};
use crate::ports::LeaseClient;

pub struct LeaseKeeper {
    orphaned: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl LeaseKeeper {
    /// Start heartbeating for one in-flight task.
    pub fn spawn(
        client: Arc<dyn LeaseClient>,
        task_id: TaskId,
        lock_duration: Duration,
        heartbeat_fraction: f64,
        lock_expires_at: DateTime<Utc>,
    ) -> Self {
        let orphaned = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = watch::channel(false);

        let join = tokio::spawn(heartbeat_loop(
            client,
            task_id,
            lock_duration,
            heartbeat_fraction,
            lock_expires_at,
            Arc::clone(&orphaned),
            stop_rx,
        ));

        Self {
            orphaned,
            stop_tx,
            join,
        }
    }

    pub fn is_orphaned(&self) -> bool {
        self.orphaned.load(Ordering::SeqCst)
    }

    /// Cancel the timer and wait for the keeper to wind down. Called the
    /// instant the dispatcher observes a terminal handler result, so no
    /// heartbeat can fire after completion. Returns the orphaned flag.
    pub async fn stop(self) -> bool {
        // ignore send error: the loop may already have exited on lease loss
        let _ = self.stop_tx.send(true);
        let _ = self.join.await;
        self.orphaned.load(Ordering::SeqCst)
    }
}

async fn heartbeat_loop(
    client: Arc<dyn LeaseClient>,
    task_id: TaskId,
    lock_duration: Duration,
    heartbeat_fraction: f64,
    mut expires_at: DateTime<Utc>,
    orphaned: Arc<AtomicBool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    // Fire when `heartbeat_fraction` of the lock duration remains.
    let lead = lock_duration.mul_f64(heartbeat_fraction);

    loop {
        let fire_at = expires_at - chrono::Duration::from_std(lead).unwrap_or_default();
        let wait = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        match client.extend_lease(&task_id, lock_duration).await {
            Ok(()) => {
                expires_at = Utc::now()
                    + chrono::Duration::from_std(lock_duration).unwrap_or_default();
                debug!(task_id = %task_id, expires_at = %expires_at, "lease extended");
            }
            Err(EngineError::LeaseLost(_)) => {
                // The one and only lease-loss log line for this task.
                warn!(
                    task_id = %task_id,
                    "lease lost mid-execution; terminal report will be suppressed"
                );
                orphaned.store(true, Ordering::SeqCst);
                break;
            }
            Err(EngineError::Transport(e)) => {
                // The lease is probably still ours; retry before it expires.
                let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                let retry_in = (remaining / 2).max(Duration::from_millis(50));
                warn!(
                    task_id = %task_id,
                    error = %e,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "lease extension failed on transport, will retry"
                );
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(retry_in) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Task, Topic, Variables};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted client: pops one canned reply per extend call.
    struct ScriptedClient {
        replies: Mutex<Vec<Result<(), EngineError>>>,
        extend_calls: Mutex<u32>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<(), EngineError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                extend_calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.extend_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LeaseClient for ScriptedClient {
        async fn claim_batch(
            &self,
            _topic: &Topic,
            _max_tasks: usize,
            _lock_duration: Duration,
        ) -> Result<Vec<Task>, EngineError> {
            Ok(vec![])
        }

        async fn extend_lease(
            &self,
            _task_id: &TaskId,
            _new_duration: Duration,
        ) -> Result<(), EngineError> {
            *self.extend_calls.lock().unwrap() += 1;
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(())
            } else {
                replies.remove(0)
            }
        }

        async fn complete(
            &self,
            _task_id: &TaskId,
            _variables: Variables,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn fail(
            &self,
            _task_id: &TaskId,
            _retries_remaining: u32,
            _retry_timeout: Duration,
            _error_message: &str,
        ) -> Result<(), EngineError> {
            Ok(())
        }

        async fn report_business_fault(
            &self,
            _task_id: &TaskId,
            _error_code: &str,
            _error_message: &str,
        ) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn keeper_with(client: Arc<ScriptedClient>, lock_ms: u64) -> LeaseKeeper {
        let lock = Duration::from_millis(lock_ms);
        LeaseKeeper::spawn(
            client,
            TaskId::new("t-1"),
            lock,
            0.5,
            Utc::now() + chrono::Duration::from_std(lock).unwrap(),
        )
    }

    #[tokio::test]
    async fn extends_before_the_lease_expires() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        // 200ms lock, fraction 0.5 -> first extension due around 100ms
        let keeper = keeper_with(Arc::clone(&client), 200);

        tokio::time::sleep(Duration::from_millis(160)).await;
        assert!(client.calls() >= 1, "no heartbeat before expiry");

        let orphaned = keeper.stop().await;
        assert!(!orphaned);
    }

    #[tokio::test]
    async fn lease_loss_marks_the_task_orphaned_and_stops() {
        let client = Arc::new(ScriptedClient::new(vec![Err(EngineError::LeaseLost(
            TaskId::new("t-1"),
        ))]));
        let keeper = keeper_with(Arc::clone(&client), 100);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(keeper.is_orphaned());
        // No further heartbeats after the loss.
        assert_eq!(client.calls(), 1);

        assert!(keeper.stop().await);
    }

    #[tokio::test]
    async fn transport_error_is_retried_not_fatal() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(EngineError::Transport("503".to_string())),
            Ok(()),
        ]));
        let keeper = keeper_with(Arc::clone(&client), 200);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(client.calls() >= 2, "expected a retry after transport error");
        assert!(!keeper.is_orphaned());

        keeper.stop().await;
    }

    #[tokio::test]
    async fn stop_cancels_a_pending_timer_immediately() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        // Long lock: timer far in the future, nothing should fire.
        let keeper = keeper_with(Arc::clone(&client), 60_000);

        tokio::time::sleep(Duration::from_millis(30)).await;
        keeper.stop().await;
        assert_eq!(client.calls(), 0);
    }
}
