//! Observability counters for one worker.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic counters, bumped from the poll loops and the dispatcher.
/// Relaxed ordering is enough; these are statistics, not synchronisation.
#[derive(Debug, Default)]
pub struct WorkerCounts {
    claimed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    business_faults: AtomicU64,
    lease_lost: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsSnapshot {
    pub claimed: u64,
    pub completed: u64,
    pub failed: u64,
    pub business_faults: u64,
    pub lease_lost: u64,
}

impl WorkerCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_claimed(&self, n: u64) {
        self.claimed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_business_fault(&self) {
        self.business_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_lease_lost(&self) {
        self.lease_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountsSnapshot {
        CountsSnapshot {
            claimed: self.claimed.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            business_faults: self.business_faults.load(Ordering::Relaxed),
            lease_lost: self.lease_lost.load(Ordering::Relaxed),
        }
    }
}
