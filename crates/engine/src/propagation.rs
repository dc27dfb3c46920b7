//! Propagation engine
//!
//! Maps a propagation mode and "is a transaction already active" to the
//! action the manager takes. Pure and total: every mode has an answer for
//! both cases.

use txscope_core::Propagation;

/// What the manager does for one `run` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Run work inside the existing transaction; do not finalize
    Join,
    /// Begin a root transaction (shadowing any existing one)
    New,
    /// Begin a transaction nested in the existing one
    Nested,
    /// Run work without a transaction
    Suppress,
    /// Reject the call; work never runs
    Fail,
}

impl Action {
    /// Whether the manager begins and finalizes a transaction for this action
    pub fn owns_finalization(&self) -> bool {
        matches!(self, Action::New | Action::Nested)
    }
}

/// Decide the action for `propagation` given whether a transaction exists
///
/// # Example
/// ```
/// use txscope_core::Propagation;
/// use txscope_engine::{decide, Action};
///
/// assert_eq!(decide(Propagation::Required, false), Action::New);
/// assert_eq!(decide(Propagation::Required, true), Action::Join);
/// assert_eq!(decide(Propagation::Mandatory, false), Action::Fail);
/// ```
pub fn decide(propagation: Propagation, has_existing: bool) -> Action {
    match (propagation, has_existing) {
        (Propagation::Required, false) => Action::New,
        (Propagation::Required, true) => Action::Join,
        (Propagation::RequiresNew, _) => Action::New,
        (Propagation::Nested, false) => Action::New,
        (Propagation::Nested, true) => Action::Nested,
        (Propagation::Mandatory, false) => Action::Fail,
        (Propagation::Mandatory, true) => Action::Join,
        (Propagation::Never, false) => Action::Suppress,
        (Propagation::Never, true) => Action::Fail,
        (Propagation::NotSupported, _) => Action::Suppress,
        (Propagation::Supports, false) => Action::Suppress,
        (Propagation::Supports, true) => Action::Join,
    }
}
