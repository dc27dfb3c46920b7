//! Transaction lifecycle state machine
//!
//! State transitions:
//! - `NotStarted` → `Active` (begin)
//! - `Active` → `Committed` (commit)
//! - `Active` → `RolledBack` (rollback)
//!
//! Terminal states: `Committed`, `RolledBack`.
//!
//! Repeating the finalize that produced the terminal state is governed by
//! [`FinalizePolicy`]. The opposite finalize after a terminal state is always
//! an [`Error::InvalidStateTransition`].
//!
//! Adapters use [`Lifecycle`] in two steps: [`Lifecycle::check`] before
//! touching the resource, [`Lifecycle::mark`] once the resource operation
//! succeeded. A failed commit leaves the lifecycle `Active` so a rollback can
//! still follow.

use crate::error::{Error, FinalizeOp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Created but not yet begun on the resource
    NotStarted,
    /// Begun and not yet finalized
    Active,
    /// Committed
    Committed,
    /// Rolled back
    RolledBack,
}

impl TransactionState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }

    fn to_u8(self) -> u8 {
        match self {
            TransactionState::NotStarted => 0,
            TransactionState::Active => 1,
            TransactionState::Committed => 2,
            TransactionState::RolledBack => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TransactionState::NotStarted,
            1 => TransactionState::Active,
            2 => TransactionState::Committed,
            _ => TransactionState::RolledBack,
        }
    }

    fn terminal_for(op: FinalizeOp) -> Self {
        match op {
            FinalizeOp::Commit => TransactionState::Committed,
            FinalizeOp::Rollback => TransactionState::RolledBack,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::NotStarted => write!(f, "not started"),
            TransactionState::Active => write!(f, "active"),
            TransactionState::Committed => write!(f, "committed"),
            TransactionState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// How a repeated finalize is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizePolicy {
    /// Repeating the finalize that ended the transaction succeeds as a no-op
    #[default]
    Idempotent,
    /// Any finalize on an ended transaction fails
    Strict,
}

/// Outcome of [`Lifecycle::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The transaction is active; perform the operation then call `mark`
    Proceed,
    /// The same finalize already happened; nothing to do
    AlreadyDone,
}

/// Thread-safe lifecycle tracker
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    policy: FinalizePolicy,
}

impl Lifecycle {
    /// New lifecycle in `NotStarted`
    pub fn new(policy: FinalizePolicy) -> Self {
        Self {
            state: AtomicU8::new(TransactionState::NotStarted.to_u8()),
            policy,
        }
    }

    /// New lifecycle already `Active`
    pub fn active(policy: FinalizePolicy) -> Self {
        Self {
            state: AtomicU8::new(TransactionState::Active.to_u8()),
            policy,
        }
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Finalize policy
    pub fn policy(&self) -> FinalizePolicy {
        self.policy
    }

    /// Whether the state is `Active`
    pub fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// `NotStarted` → `Active`
    ///
    /// Returns false if the lifecycle had already started.
    pub fn start(&self) -> bool {
        self.state
            .compare_exchange(
                TransactionState::NotStarted.to_u8(),
                TransactionState::Active.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Decide whether `op` may run in the current state
    ///
    /// # Errors
    /// `InvalidStateTransition` when not started, when the opposite finalize
    /// already happened, or on any repeat under [`FinalizePolicy::Strict`].
    pub fn check(&self, op: FinalizeOp) -> Result<Transition, Error> {
        let state = self.state();
        match state {
            TransactionState::Active => Ok(Transition::Proceed),
            s if s == TransactionState::terminal_for(op)
                && self.policy == FinalizePolicy::Idempotent =>
            {
                Ok(Transition::AlreadyDone)
            }
            from => Err(Error::invalid_state(from, op)),
        }
    }

    /// `Active` → terminal state for `op`
    ///
    /// Returns false if the lifecycle was not active (another caller won).
    pub fn mark(&self, op: FinalizeOp) -> bool {
        self.state
            .compare_exchange(
                TransactionState::Active.to_u8(),
                TransactionState::terminal_for(op).to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(FinalizePolicy::default())
    }
}
