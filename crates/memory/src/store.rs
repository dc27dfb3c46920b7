//! Committed state of the in-memory resource
//!
//! `MemoryStore` is a cheaply clonable handle; clones share one map, one set
//! of counters and one set of fault switches.

use crate::error::{MemoryError, Result};
use crate::session::{Op, Session};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use txscope_core::{Context, FinalizePolicy};

/// Session counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Sessions begun
    pub begun: u64,
    /// Sessions committed
    pub committed: u64,
    /// Sessions aborted
    pub aborted: u64,
}

#[derive(Default)]
struct Faults {
    begin: AtomicBool,
    commit: AtomicBool,
    rollback: AtomicBool,
}

#[derive(Default)]
struct StoreInner {
    data: RwLock<BTreeMap<String, String>>,
    next_session: AtomicU64,
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    faults: Faults,
}

/// In-memory key/value resource with transactional sessions
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed value for `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.data.read().get(key).cloned()
    }

    /// Whether `key` is committed
    pub fn contains(&self, key: &str) -> bool {
        self.inner.data.read().contains_key(key)
    }

    /// Number of committed keys
    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    /// Whether nothing is committed
    pub fn is_empty(&self) -> bool {
        self.inner.data.read().is_empty()
    }

    /// Copy of all committed data
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.data.read().clone()
    }

    /// Session counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            begun: self.inner.begun.load(Ordering::Relaxed),
            committed: self.inner.committed.load(Ordering::Relaxed),
            aborted: self.inner.aborted.load(Ordering::Relaxed),
        }
    }

    /// Make the next begin fail with [`MemoryError::Injected`]
    pub fn fail_next_begin(&self) {
        self.inner.faults.begin.store(true, Ordering::SeqCst);
    }

    /// Make the next session commit fail with [`MemoryError::Injected`]
    pub fn fail_next_commit(&self) {
        self.inner.faults.commit.store(true, Ordering::SeqCst);
    }

    /// Make the next session abort fail with [`MemoryError::Injected`]
    pub fn fail_next_rollback(&self) {
        self.inner.faults.rollback.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_begin_fault(&self) -> Result<()> {
        take_fault(&self.inner.faults.begin, "begin")
    }

    pub(crate) fn take_commit_fault(&self) -> Result<()> {
        take_fault(&self.inner.faults.commit, "commit")
    }

    pub(crate) fn take_rollback_fault(&self) -> Result<()> {
        take_fault(&self.inner.faults.rollback, "rollback")
    }

    /// Begin a session
    ///
    /// # Errors
    /// An injected begin fault, or a cancelled context.
    pub fn begin_session(&self, ctx: &Context, policy: FinalizePolicy) -> Result<Session> {
        self.take_begin_fault()?;
        if let Some(reason) = ctx.cancel_reason() {
            return Err(MemoryError::Cancelled(reason));
        }
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.begun.fetch_add(1, Ordering::Relaxed);
        debug!(target: "txscope::memory", session = id, "Session begun");
        Ok(Session::new(id, self.clone(), policy))
    }

    /// Apply staged operations atomically
    ///
    /// All inserts are validated before anything is written.
    pub(crate) fn apply(&self, ops: &[Op]) -> Result<()> {
        let mut data = self.inner.data.write();
        let mut inserted = std::collections::BTreeSet::new();
        for op in ops {
            if let Op::Insert(key, _) = op {
                if data.contains_key(key) || !inserted.insert(key.as_str()) {
                    return Err(MemoryError::DuplicateKey(key.clone()));
                }
            }
        }
        for op in ops {
            match op {
                Op::Insert(key, value) | Op::Put(key, value) => {
                    data.insert(key.clone(), value.clone());
                }
                Op::Delete(key) => {
                    data.remove(key);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn record_committed(&self) {
        self.inner.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_aborted(&self) {
        self.inner.aborted.fetch_add(1, Ordering::Relaxed);
    }
}

fn take_fault(flag: &AtomicBool, what: &'static str) -> Result<()> {
    if flag.swap(false, Ordering::SeqCst) {
        Err(MemoryError::Injected(what))
    } else {
        Ok(())
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}
