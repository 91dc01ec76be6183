//! Poll loop: per-topic claim pump.
//!
//! `Idle -> Polling -> {Backoff | Dispatching}`, forever. The loop hands
//! claimed tasks to the dispatcher and returns to polling immediately, it
//! never waits for handlers to finish; back-pressure comes solely from the
//! shared slot table. Transport errors back the loop off exponentially but
//! never stop it; only the shutdown signal does that.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::TopicConfig;
use crate::domain::Topic;
use crate::ports::LeaseClient;

use super::dispatcher::Dispatcher;

pub(crate) async fn poll_loop(
    topic: Topic,
    cfg: Arc<TopicConfig>,
    client: Arc<dyn LeaseClient>,
    dispatcher: Arc<Dispatcher>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // Transport backoff follows the same curve as task retries.
    let backoff = cfg.retry_policy();
    let mut consecutive_errors: u32 = 0;

    info!(topic = %topic, "poll loop started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // Idle until at least one slot is free; claiming with zero slots
        // would just lock tasks we cannot start.
        let free = dispatcher.slots().free().await;
        if free == 0 {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = dispatcher.slots().wait_for_free() => {}
            }
            continue;
        }

        let max_tasks = cfg.max_tasks_per_poll.min(free);

        // The claim call is bounded by the client's own request timeout, so
        // shutdown is not raced against it; it takes effect at the next
        // checkpoint instead. That way a batch that arrives during shutdown
        // is still seen and released cleanly rather than silently dropped.
        let claimed = client.claim_batch(&topic, max_tasks, cfg.lock_duration).await;

        match claimed {
            Ok(mut tasks) => {
                consecutive_errors = 0;

                if tasks.len() > max_tasks {
                    // Engine-side truncation is assumed; enforce it anyway.
                    warn!(
                        topic = %topic,
                        returned = tasks.len(),
                        max_tasks,
                        "engine returned more tasks than requested, truncating"
                    );
                    let excess = tasks.split_off(max_tasks);
                    for task in &excess {
                        dispatcher.release_unstarted(task, "claim exceeded batch limit").await;
                    }
                }

                if tasks.is_empty() {
                    // Empty queue: wait for the poll interval instead of
                    // hot-looping against it.
                    tokio::select! {
                        _ = shutdown_rx.changed() => continue,
                        _ = tokio::time::sleep(cfg.poll_interval) => continue,
                    }
                }

                debug!(topic = %topic, claimed = tasks.len(), "claimed batch");
                dispatcher.counts().add_claimed(tasks.len() as u64);

                let mut tasks = tasks.into_iter();
                for task in tasks.by_ref() {
                    if *shutdown_rx.borrow() {
                        // Shutdown landed between claim and dispatch: this
                        // task never starts, hand its lease straight back.
                        dispatcher.release_unstarted(&task, "worker shutting down").await;
                        for rest in tasks.by_ref() {
                            dispatcher.release_unstarted(&rest, "worker shutting down").await;
                        }
                        break;
                    }
                    dispatcher.dispatch(task, Arc::clone(&cfg), &mut shutdown_rx).await;
                }
            }
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                let delay = backoff.next_delay(consecutive_errors);
                warn!(
                    topic = %topic,
                    error = %e,
                    consecutive_errors,
                    backoff_ms = delay.as_millis() as u64,
                    "claim failed, backing off"
                );
                tokio::select! {
                    _ = shutdown_rx.changed() => continue,
                    _ = tokio::time::sleep(delay) => continue,
                }
            }
        }
    }

    info!(topic = %topic, "poll loop stopped");
}
