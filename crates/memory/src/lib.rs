//! In-memory reference adapter for txscope
//!
//! A small transactional key/value store with real begin/commit/abort
//! semantics, used by the test-suite, benches and examples:
//! - MemoryStore: committed data, counters, fault injection
//! - Session: staged writes, savepoints, concurrent-use detection
//! - MemoryTransaction / MemoryFactory: the `Transaction` and
//!   `TransactionFactory` implementations
//!
//! Nothing here is durable.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod session;
pub mod store;
pub mod transaction;

pub use error::{MemoryError, Result};
pub use session::{Savepoint, Session};
pub use store::{MemoryStore, StoreStats};
pub use transaction::{
    session_from, session_from_key, MemoryConfig, MemoryFactory, MemoryTransaction, NestingKind,
};
