//! Error types for txscope
//!
//! Every failure the manager reports carries a stable [`ErrorKind`] and keeps
//! the adapter's or work closure's original error as its cause, so callers can
//! test for either. We use `thiserror` for automatic `Display` and `Error`
//! trait implementations.
//!
//! A work failure followed by a failed rollback is reported as
//! [`Error::RollbackFailed`], which holds both causes. `std::error::Error::source`
//! can only expose one of them, so [`Error::is`] and [`Error::find`] walk the
//! full cause tree instead of the linear source chain.

use crate::context::CancelReason;
use crate::settings::Propagation;
use crate::state::TransactionState;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Boxed error used at the adapter and work-closure boundaries
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type alias for txscope operations
pub type Result<T> = std::result::Result<T, Error>;

/// A finalize operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinalizeOp {
    /// Commit
    Commit,
    /// Rollback
    Rollback,
}

impl fmt::Display for FinalizeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizeOp::Commit => write!(f, "commit"),
            FinalizeOp::Rollback => write!(f, "rollback"),
        }
    }
}

/// Stable discriminant of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Mandatory without a transaction, or Never with one
    PropagationViolation,
    /// The context was cancelled before a transaction could begin
    Cancelled,
    /// The adapter failed to begin a transaction
    BeginFailure,
    /// The adapter failed to commit
    CommitFailure,
    /// Work failed and the transaction was rolled back
    RolledBack,
    /// Work failed and the rollback failed as well
    RollbackFailure,
    /// Finalize called in a state that does not allow it
    InvalidStateTransition,
    /// Work error passed through without transaction bookkeeping
    Work,
}

/// Error taxonomy for transaction coordination
#[derive(Debug, Error)]
pub enum Error {
    /// Propagation rule rejected the call; work was never invoked
    #[error("propagation {propagation} violated: {}", violation_reason(.existing))]
    PropagationViolation {
        /// Mode requested by the call
        propagation: Propagation,
        /// Whether a transaction was already active
        existing: bool,
    },

    /// Context was already cancelled when a transaction had to begin
    #[error("context cancelled before begin: {0}")]
    Cancelled(CancelReason),

    /// Adapter failed to begin a transaction
    #[error("begin transaction: {0}")]
    Begin(#[source] BoxError),

    /// Adapter failed to commit
    #[error("commit transaction: {0}")]
    Commit(#[source] BoxError),

    /// Work failed; the transaction was rolled back successfully
    #[error("transaction rolled back: {0}")]
    RolledBack(#[source] BoxError),

    /// Work failed and rollback failed too; the resource may still hold an
    /// open transaction
    #[error("rollback transaction: {rollback} (after work error: {work})")]
    RollbackFailed {
        /// Error returned by the work closure
        work: BoxError,
        /// Error returned by the adapter's rollback
        #[source]
        rollback: BoxError,
    },

    /// Finalize requested from a state that does not allow it
    #[error("invalid transaction state: cannot {attempted} a {from} transaction")]
    InvalidStateTransition {
        /// State the transaction was in
        from: TransactionState,
        /// Operation that was attempted
        attempted: FinalizeOp,
    },

    /// Work error returned unchanged (join and suppress paths)
    #[error(transparent)]
    Work(BoxError),
}

fn violation_reason(existing: &bool) -> &'static str {
    if *existing {
        "a transaction is already active"
    } else {
        "no active transaction"
    }
}

impl Error {
    /// Wrap a work error without double-wrapping txscope errors
    ///
    /// Work closures that call `run` themselves return txscope errors; those
    /// are unboxed and returned as they are.
    pub fn from_work(err: BoxError) -> Self {
        match err.downcast::<Error>() {
            Ok(own) => *own,
            Err(other) => Error::Work(other),
        }
    }

    /// Create an invalid state transition error
    pub fn invalid_state(from: TransactionState, attempted: FinalizeOp) -> Self {
        Error::InvalidStateTransition { from, attempted }
    }

    /// Discriminant of this error (not of its causes)
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PropagationViolation { .. } => ErrorKind::PropagationViolation,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Begin(_) => ErrorKind::BeginFailure,
            Error::Commit(_) => ErrorKind::CommitFailure,
            Error::RolledBack(_) => ErrorKind::RolledBack,
            Error::RollbackFailed { .. } => ErrorKind::RollbackFailure,
            Error::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            Error::Work(_) => ErrorKind::Work,
        }
    }

    /// Whether this error or any cause in its tree has the given kind
    pub fn is(&self, kind: ErrorKind) -> bool {
        visit(self, &mut |node| {
            node.downcast_ref::<Error>()
                .map_or(false, |own| own.kind() == kind)
        })
    }

    /// First error of concrete type `E` in the cause tree, including self
    pub fn find<E: StdError + 'static>(&self) -> Option<&E> {
        let mut found = None;
        visit(self, &mut |node| match node.downcast_ref::<E>() {
            Some(e) => {
                found = Some(e);
                true
            }
            None => false,
        });
        found
    }

    /// Whether the cause tree contains an error of concrete type `E`
    pub fn contains<E: StdError + 'static>(&self) -> bool {
        self.find::<E>().is_some()
    }
}

/// Depth-first walk over the cause tree; stops when `f` returns true
fn visit<'a, F>(err: &'a (dyn StdError + 'static), f: &mut F) -> bool
where
    F: FnMut(&'a (dyn StdError + 'static)) -> bool,
{
    if f(err) {
        return true;
    }
    if let Some(own) = err.downcast_ref::<Error>() {
        return match own {
            Error::RollbackFailed { work, rollback } => {
                visit(&**work, f) || visit(&**rollback, f)
            }
            Error::Begin(cause)
            | Error::Commit(cause)
            | Error::RolledBack(cause)
            | Error::Work(cause) => visit(&**cause, f),
            _ => false,
        };
    }
    match err.source() {
        Some(next) => visit(next, f),
        None => false,
    }
}
