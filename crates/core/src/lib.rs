//! Core types and traits for txscope
//!
//! This crate defines the vocabulary shared by the manager and by resource
//! adapters:
//! - Context: immutable execution context with cancellation and the
//!   transaction registry
//! - Transaction / TransactionFactory: the capability contract adapters implement
//! - TransactionHandle: a registered transaction plus manager bookkeeping
//! - Settings / Propagation: per-call configuration
//! - Lifecycle: reusable begin/commit/rollback state machine for adapters
//! - Error: the error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod registry;
pub mod settings;
pub mod state;
pub mod traits;
pub mod types;

pub use context::{CancelHandle, CancelReason, Context};
pub use error::{BoxError, Error, ErrorKind, FinalizeOp, Result};
pub use registry::{
    current_transaction, current_transaction_by_key, with_transaction, without_transaction,
    TransactionHandle,
};
pub use settings::{Propagation, Settings};
pub use state::{FinalizePolicy, Lifecycle, TransactionState, Transition};
pub use traits::{Transaction, TransactionFactory};
pub use types::{ContextKey, TransactionId};
