//! Error types for the in-memory adapter

use thiserror::Error;
use txscope_core::{CancelReason, TransactionState};

/// Result type alias for in-memory adapter operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors raised by the in-memory store and its sessions
#[derive(Debug, Error)]
pub enum MemoryError {
    /// `insert` of a key that was already committed
    #[error("duplicate key '{0}'")]
    DuplicateKey(String),

    /// Two call chains touched one session at the same time
    #[error("session {0} used concurrently by another call chain")]
    ConcurrentUse(u64),

    /// Operation on a session that is no longer active
    #[error("session {id} is {state}")]
    Inactive {
        /// Session id
        id: u64,
        /// State the session was in
        state: TransactionState,
    },

    /// Savepoint does not exist (already released or rolled back)
    #[error("unknown savepoint {0}")]
    UnknownSavepoint(usize),

    /// Nested begin with a parent from another adapter
    #[error("parent transaction does not belong to the in-memory adapter")]
    ForeignParent,

    /// The context was no longer live at commit
    #[error("context no longer live: {0}")]
    Cancelled(#[from] CancelReason),

    /// Fault injected through `MemoryStore::fail_next_*`
    #[error("injected {0} failure")]
    Injected(&'static str),

    /// Finalize rejected by the session lifecycle
    #[error("session finalize rejected: {0}")]
    State(#[from] txscope_core::Error),
}
