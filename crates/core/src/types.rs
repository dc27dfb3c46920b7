//! Identifier types
//!
//! - ContextKey: identity of one logical manager inside the context registry
//! - TransactionId: process-unique identifier assigned to each begun transaction

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Identity under which a manager registers its transactions in a [`Context`].
///
/// Two managers sharing a key see each other's transactions (that is how
/// nested `run` calls through different manager instances join). Managers
/// coordinating different resources must use different keys.
///
/// [`Context`]: crate::Context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey(Uuid);

impl ContextKey {
    /// The key used when settings do not name one
    pub const DEFAULT: ContextKey = ContextKey(Uuid::nil());

    /// Create a new random key using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a key from its string form
    ///
    /// Returns None if the string is not a valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Whether this is [`ContextKey::DEFAULT`]
    pub fn is_default(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ContextKey {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "default")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a begun transaction
///
/// Assigned by the manager, not by adapters, so observer events can name a
/// transaction regardless of which resource it runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocate the next identifier
    pub fn next() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}
