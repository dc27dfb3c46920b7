//! Sessions: staged writes against a [`MemoryStore`]
//!
//! A session buffers operations until commit, then applies them in one
//! write-locked step. Reads see committed data overlaid with the session's
//! own staged writes.
//!
//! A session must be driven by one call chain at a time. Every operation
//! takes the session lock with `try_lock`; contention means two call chains
//! share the session and is reported as [`MemoryError::ConcurrentUse`]
//! instead of blocking.

use crate::error::{MemoryError, Result};
use crate::store::MemoryStore;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use tracing::{debug, warn};
use txscope_core::{Context, FinalizeOp, FinalizePolicy, Lifecycle, TransactionState, Transition};

/// A staged operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    Insert(String, String),
    Put(String, String),
    Delete(String),
}

/// Marker returned by [`Session::savepoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint(usize);

impl Savepoint {
    /// Position in the session's savepoint stack
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Default)]
struct Staged {
    ops: Vec<Op>,
    marks: Vec<usize>,
}

/// Transactional session on a [`MemoryStore`]
pub struct Session {
    id: u64,
    store: MemoryStore,
    staged: Mutex<Staged>,
    lifecycle: Lifecycle,
}

impl Session {
    pub(crate) fn new(id: u64, store: MemoryStore, policy: FinalizePolicy) -> Self {
        Self {
            id,
            store,
            staged: Mutex::new(Staged::default()),
            lifecycle: Lifecycle::active(policy),
        }
    }

    /// Session id, unique per store
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransactionState {
        self.lifecycle.state()
    }

    /// Whether the session can still be used
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    /// Store this session writes to
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Stage an insert; fails at commit if the key is already committed
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.stage(Op::Insert(key.into(), value.into()))
    }

    /// Stage an upsert
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.stage(Op::Put(key.into(), value.into()))
    }

    /// Stage a delete
    pub fn delete(&self, key: impl Into<String>) -> Result<()> {
        self.stage(Op::Delete(key.into()))
    }

    /// Read `key` as this session sees it
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let staged = self.lock()?;
        self.ensure_active()?;
        let mut value = self.store.get(key);
        for op in &staged.ops {
            match op {
                Op::Insert(k, v) | Op::Put(k, v) if k == key => value = Some(v.clone()),
                Op::Delete(k) if k == key => value = None,
                _ => {}
            }
        }
        Ok(value)
    }

    /// Number of staged operations
    pub fn pending(&self) -> Result<usize> {
        Ok(self.lock()?.ops.len())
    }

    /// Mark the current position so later writes can be undone alone
    pub fn savepoint(&self) -> Result<Savepoint> {
        let mut staged = self.lock()?;
        self.ensure_active()?;
        let mark = staged.ops.len();
        staged.marks.push(mark);
        Ok(Savepoint(staged.marks.len() - 1))
    }

    /// Discard writes made after `savepoint`, and the savepoint itself
    pub fn rollback_to(&self, savepoint: Savepoint) -> Result<()> {
        let mut staged = self.lock()?;
        self.ensure_active()?;
        let mark = *staged
            .marks
            .get(savepoint.0)
            .ok_or(MemoryError::UnknownSavepoint(savepoint.0))?;
        staged.ops.truncate(mark);
        staged.marks.truncate(savepoint.0);
        Ok(())
    }

    /// Forget `savepoint`, keeping its writes
    pub fn release(&self, savepoint: Savepoint) -> Result<()> {
        let mut staged = self.lock()?;
        self.ensure_active()?;
        if savepoint.0 >= staged.marks.len() {
            return Err(MemoryError::UnknownSavepoint(savepoint.0));
        }
        staged.marks.truncate(savepoint.0);
        Ok(())
    }

    /// Number of open savepoints
    pub fn savepoint_depth(&self) -> Result<usize> {
        Ok(self.lock()?.marks.len())
    }

    /// Apply staged writes to the store
    ///
    /// A failed commit leaves the session active.
    ///
    /// # Errors
    /// Lifecycle violations, injected faults, a cancelled `ctx`, duplicate
    /// inserts.
    pub fn commit(&self, ctx: &Context) -> Result<()> {
        if self.lifecycle.check(FinalizeOp::Commit)? == Transition::AlreadyDone {
            return Ok(());
        }
        let mut staged = self.lock()?;
        self.store.take_commit_fault()?;
        if let Some(reason) = ctx.cancel_reason() {
            return Err(MemoryError::Cancelled(reason));
        }
        self.store.apply(&staged.ops)?;
        if !self.lifecycle.mark(FinalizeOp::Commit) {
            return Err(MemoryError::Inactive {
                id: self.id,
                state: self.state(),
            });
        }
        let applied = staged.ops.len();
        staged.ops.clear();
        staged.marks.clear();
        self.store.record_committed();
        debug!(target: "txscope::memory", session = self.id, ops = applied, "Session committed");
        Ok(())
    }

    /// Discard staged writes
    ///
    /// Never checks cancellation: cleanup has to work on an expired context.
    /// The first abort is terminal: a failed abort still leaves the session
    /// rolled back, with its staged writes discarded.
    ///
    /// # Errors
    /// Lifecycle violations and injected faults.
    pub fn abort(&self, _ctx: &Context) -> Result<()> {
        if self.lifecycle.check(FinalizeOp::Rollback)? == Transition::AlreadyDone {
            return Ok(());
        }
        let mut staged = self.lock()?;
        let fault = self.store.take_rollback_fault();
        if self.lifecycle.mark(FinalizeOp::Rollback) {
            let discarded = staged.ops.len();
            staged.ops.clear();
            staged.marks.clear();
            self.store.record_aborted();
            match &fault {
                Ok(()) => debug!(
                    target: "txscope::memory",
                    session = self.id,
                    ops = discarded,
                    "Session aborted"
                ),
                Err(e) => warn!(
                    target: "txscope::memory",
                    session = self.id,
                    ops = discarded,
                    error = %e,
                    "Session abort failed; session closed"
                ),
            }
        }
        fault
    }

    pub(crate) fn check_active(&self, op: FinalizeOp) -> Result<()> {
        let state = self.state();
        if state == TransactionState::Active {
            Ok(())
        } else {
            Err(txscope_core::Error::invalid_state(state, op).into())
        }
    }

    fn stage(&self, op: Op) -> Result<()> {
        let mut staged = self.lock()?;
        self.ensure_active()?;
        staged.ops.push(op);
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(MemoryError::Inactive {
                id: self.id,
                state: self.state(),
            })
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Staged>> {
        self.staged
            .try_lock()
            .ok_or(MemoryError::ConcurrentUse(self.id))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
