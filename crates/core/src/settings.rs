//! Per-call transaction settings
//!
//! Settings are immutable value objects. A manager holds a default set; each
//! call may pass its own. Builder methods consume and return a new value.

use crate::types::ContextKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Propagation mode: what to do given the transaction already on the context
///
/// | Mode | No existing | Existing |
/// |------|-------------|----------|
/// | `Required` | new | join |
/// | `RequiresNew` | new | new, existing shadowed |
/// | `Nested` | new | nested in existing |
/// | `Mandatory` | fail | join |
/// | `Never` | no transaction | fail |
/// | `NotSupported` | no transaction | no transaction, existing shadowed |
/// | `Supports` | no transaction | join |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Join the current transaction or start one
    #[default]
    Required,
    /// Always start a new transaction
    RequiresNew,
    /// Start a transaction nested in the current one, or a new one
    Nested,
    /// Join the current transaction; fail if there is none
    Mandatory,
    /// Run without a transaction; fail if one is active
    Never,
    /// Run without a transaction, hiding any active one
    NotSupported,
    /// Join the current transaction if there is one
    Supports,
}

impl Propagation {
    /// All modes, in declaration order
    pub const ALL: [Propagation; 7] = [
        Propagation::Required,
        Propagation::RequiresNew,
        Propagation::Nested,
        Propagation::Mandatory,
        Propagation::Never,
        Propagation::NotSupported,
        Propagation::Supports,
    ];

    /// Config-file spelling of this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            Propagation::Required => "required",
            Propagation::RequiresNew => "requires_new",
            Propagation::Nested => "nested",
            Propagation::Mandatory => "mandatory",
            Propagation::Never => "never",
            Propagation::NotSupported => "not_supported",
            Propagation::Supports => "supports",
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Propagation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Propagation::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown propagation '{}'", s))
    }
}

/// Configuration for one `run` invocation
///
/// # Example
/// ```
/// use std::time::Duration;
/// use txscope_core::{Propagation, Settings};
///
/// let settings = Settings::new()
///     .with_propagation(Propagation::Nested)
///     .with_timeout(Duration::from_secs(2));
/// assert_eq!(settings.propagation(), Propagation::Nested);
/// assert!(settings.cancelable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    propagation: Propagation,
    cancelable: bool,
    prefer_savepoint: bool,
    ctx_key: ContextKey,
    timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            propagation: Propagation::Required,
            cancelable: true,
            prefer_savepoint: true,
            ctx_key: ContextKey::DEFAULT,
            timeout: None,
        }
    }
}

impl Settings {
    /// Create settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the propagation mode
    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Set whether the transaction scope follows the caller's cancellation
    ///
    /// When false, work and finalize run on a context detached from the
    /// caller's cancellation and deadline.
    pub fn with_cancelable(mut self, cancelable: bool) -> Self {
        self.cancelable = cancelable;
        self
    }

    /// Set whether nested transactions should ask for a savepoint
    pub fn with_prefer_savepoint(mut self, prefer_savepoint: bool) -> Self {
        self.prefer_savepoint = prefer_savepoint;
        self
    }

    /// Set the registry key (manager identity)
    pub fn with_ctx_key(mut self, ctx_key: ContextKey) -> Self {
        self.ctx_key = ctx_key;
        self
    }

    /// Bound the lifetime of transactions started under these settings
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Remove any timeout
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Propagation mode
    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// Whether the scope follows caller cancellation
    pub fn cancelable(&self) -> bool {
        self.cancelable
    }

    /// Whether nested transactions prefer savepoints
    pub fn prefer_savepoint(&self) -> bool {
        self.prefer_savepoint
    }

    /// Registry key
    pub fn ctx_key(&self) -> ContextKey {
        self.ctx_key
    }

    /// Transaction timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
