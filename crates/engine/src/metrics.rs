//! Manager metrics
//!
//! Counters use Relaxed ordering: they are observational only and do not
//! synchronize any other memory operation. Snapshots may be slightly
//! inconsistent across fields under concurrent load.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    started: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    begin_failures: AtomicU64,
    commit_failures: AtomicU64,
    rollback_failures: AtomicU64,
    joined: AtomicU64,
    suppressed: AtomicU64,
    active: AtomicU64,
}

impl MetricsRecorder {
    pub(crate) fn record_started(&self) -> ActiveGuard<'_> {
        self.started.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
        ActiveGuard { recorder: self }
    }

    pub(crate) fn record_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rolled_back(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_begin_failure(&self) {
        self.begin_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit_failure(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback_failure(&self) {
        self.rollback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_joined(&self) {
        self.joined.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ManagerMetrics {
        let started = self.started.load(Ordering::Relaxed);
        let committed = self.committed.load(Ordering::Relaxed);
        ManagerMetrics {
            started,
            committed,
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            begin_failures: self.begin_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            rollback_failures: self.rollback_failures.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }
}

/// Decrements the active gauge when an owned transaction leaves scope,
/// including by panic
pub(crate) struct ActiveGuard<'a> {
    recorder: &'a MetricsRecorder,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.recorder.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Snapshot of a manager's counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManagerMetrics {
    /// Transactions begun by this manager
    pub started: u64,
    /// Transactions committed
    pub committed: u64,
    /// Transactions rolled back (after a work error, a panic or a failed commit)
    pub rolled_back: u64,
    /// Factory `begin` failures
    pub begin_failures: u64,
    /// Adapter `commit` failures
    pub commit_failures: u64,
    /// Adapter `rollback` failures
    pub rollback_failures: u64,
    /// Calls that joined an existing transaction
    pub joined: u64,
    /// Calls that ran without a transaction
    pub suppressed: u64,
    /// Transactions currently owned by a running call
    pub active: u64,
    /// Commit success rate (committed / started)
    pub commit_rate: f64,
}

impl ManagerMetrics {
    /// Owned transactions that reached a terminal outcome
    pub fn total_completed(&self) -> u64 {
        self.committed + self.rolled_back
    }

    /// Rollback rate (rolled_back / started)
    pub fn rollback_rate(&self) -> f64 {
        if self.started > 0 {
            self.rolled_back as f64 / self.started as f64
        } else {
            0.0
        }
    }
}
