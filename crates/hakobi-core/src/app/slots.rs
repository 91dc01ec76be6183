//! Slot table: the shared concurrency pool plus the in-flight set.
//!
//! Design:
//! - One mutex guards both the free-slot counter and the in-flight set, so
//!   a task starts (insert + decrement) and finishes (remove + increment)
//!   atomically. Splitting them would open a window for a slot leak or a
//!   ghost in-flight entry under concurrent completion and shutdown.
//! - The lock is only ever held for the map/counter updates, never across
//!   an await on I/O.
//! - Waiters (saturated dispatch, idle shutdown drain) park on a `Notify`.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::TaskId;

#[derive(Debug)]
struct SlotState {
    in_flight: HashSet<TaskId>,
    free: usize,
}

/// Why a slot could not be handed out.
#[derive(Debug, PartialEq, Eq)]
pub enum AcquireError {
    /// This `task_id` is already executing here. The engine should never
    /// double-claim, so hitting this is a defensive path, not an expected one.
    AlreadyInFlight,
}

pub struct SlotTable {
    state: Mutex<SlotState>,
    notify: Notify,
    capacity: usize,
}

impl SlotTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(SlotState {
                in_flight: HashSet::new(),
                free: capacity,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Narrow read-only query for the poll loop's `available slots`
    /// computation. The raw counter is never exposed for mutation.
    pub async fn free(&self) -> usize {
        self.state.lock().await.free
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Take one slot for `task_id`, waiting while the pool is saturated.
    /// This wait is the back-pressure that throttles the poll loops.
    pub async fn acquire(&self, task_id: &TaskId) -> Result<(), AcquireError> {
        loop {
            // Register interest before re-checking state so a release that
            // lands in between still wakes us.
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if state.in_flight.contains(task_id) {
                    return Err(AcquireError::AlreadyInFlight);
                }
                if state.free > 0 {
                    state.free -= 1;
                    state.in_flight.insert(task_id.clone());
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Give the slot back. Safe to call once per successful `acquire`.
    pub async fn release(&self, task_id: &TaskId) {
        {
            let mut state = self.state.lock().await;
            if state.in_flight.remove(task_id) {
                state.free += 1;
            }
        }
        // Wake one saturated dispatcher *and* anyone draining; notify_waiters
        // covers both without tracking who waits for what.
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Park until at least one slot is free.
    pub async fn wait_for_free(&self) {
        loop {
            let notified = self.notify.notified();
            if self.state.lock().await.free > 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait until nothing is in flight, up to `grace`. Returns how many
    /// tasks were still running when we gave up (0 on a clean drain).
    pub async fn wait_idle(&self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        loop {
            let notified = self.notify.notified();
            let remaining = {
                let state = self.state.lock().await;
                state.in_flight.len()
            };
            if remaining == 0 {
                return 0;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.state.lock().await.in_flight.len();
            }
        }
    }
}
