//! Observer hooks
//!
//! The manager reports lifecycle events to every registered [`Observer`].
//! Observers are for logging, metrics export and tests; they cannot change
//! the outcome of a `run` call. A panicking observer is caught and logged.

use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};
use txscope_core::{Propagation, TransactionId};

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A transaction was begun
    Begin,
    /// A transaction was committed
    Commit,
    /// A transaction was rolled back (cause: the work error, if any)
    Rollback,
    /// Begin, commit or rollback failed (cause: the adapter error)
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Begin => write!(f, "begin"),
            EventKind::Commit => write!(f, "commit"),
            EventKind::Rollback => write!(f, "rollback"),
            EventKind::Error => write!(f, "error"),
        }
    }
}

/// A lifecycle event
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    /// What happened
    pub kind: EventKind,
    /// Manager-assigned transaction id
    pub transaction_id: TransactionId,
    /// Propagation mode of the call that owns the transaction
    pub propagation: Propagation,
    /// Nesting depth of the transaction (0 for root)
    pub depth: usize,
    /// Underlying error, when there is one
    pub cause: Option<&'a (dyn StdError + 'static)>,
}

impl<'a> Event<'a> {
    pub(crate) fn new(
        kind: EventKind,
        transaction_id: TransactionId,
        propagation: Propagation,
        depth: usize,
    ) -> Self {
        Self {
            kind,
            transaction_id,
            propagation,
            depth,
            cause: None,
        }
    }

    pub(crate) fn with_cause(mut self, cause: &'a (dyn StdError + 'static)) -> Self {
        self.cause = Some(cause);
        self
    }
}

/// Receives lifecycle events from a manager
pub trait Observer: Send + Sync {
    /// Called synchronously on the thread running the transaction
    fn on_event(&self, event: &Event<'_>);
}

impl<F> Observer for F
where
    F: Fn(&Event<'_>) + Send + Sync,
{
    fn on_event(&self, event: &Event<'_>) {
        self(event)
    }
}

/// Observer that writes every event to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &Event<'_>) {
        match (event.kind, event.cause) {
            (EventKind::Error, Some(cause)) => warn!(
                target: "txscope::observer",
                txn = %event.transaction_id,
                propagation = %event.propagation,
                depth = event.depth,
                error = %cause,
                "Transaction error"
            ),
            (kind, Some(cause)) => debug!(
                target: "txscope::observer",
                txn = %event.transaction_id,
                propagation = %event.propagation,
                depth = event.depth,
                cause = %cause,
                "Transaction {}", kind
            ),
            (kind, None) => debug!(
                target: "txscope::observer",
                txn = %event.transaction_id,
                propagation = %event.propagation,
                depth = event.depth,
                "Transaction {}", kind
            ),
        }
    }
}

/// Deliver `event` to each observer, isolating panics
pub(crate) fn notify(observers: &[Arc<dyn Observer>], event: &Event<'_>) {
    for observer in observers {
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(event)));
        if delivered.is_err() {
            error!(
                target: "txscope::observer",
                txn = %event.transaction_id,
                kind = %event.kind,
                "Observer panicked; event dropped for this observer"
            );
        }
    }
}
