//! Chained managers
//!
//! Runs one unit of work inside a transaction on each of several resources.
//! Managers are entered in order (the first is outermost), so commits happen
//! innermost first. Any failure unwinds through the normal error path of every
//! enclosing manager and rolls those back.
//!
//! This is not two-phase commit: once an inner manager has committed, a
//! failure in an outer commit does not undo it.

use crate::manager::Manager;
use std::fmt;
use std::sync::Arc;
use txscope_core::{BoxError, Context, Error, Result};

/// Ordered list of managers acting as one
#[derive(Clone, Default)]
pub struct ChainedManager {
    managers: Vec<Arc<Manager>>,
}

impl ChainedManager {
    /// Chain `managers`, outermost first
    pub fn new(managers: Vec<Arc<Manager>>) -> Self {
        Self { managers }
    }

    /// Append a manager as the new innermost one
    pub fn push(&mut self, manager: Arc<Manager>) {
        self.managers.push(manager);
    }

    /// Number of chained managers
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Run `work` inside every manager's default settings
    ///
    /// With no managers, work runs directly on `ctx`.
    pub fn run<T, E, F>(&self, ctx: &Context, work: F) -> Result<T>
    where
        F: FnOnce(&Context) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        self.run_from(0, ctx, work)
    }

    fn run_from<T, E, F>(&self, idx: usize, ctx: &Context, work: F) -> Result<T>
    where
        F: FnOnce(&Context) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        match self.managers.get(idx) {
            None => work(ctx).map_err(|e| Error::from_work(e.into())),
            Some(manager) if idx + 1 == self.managers.len() => manager.run(ctx, work),
            Some(manager) => manager.run(ctx, |scope| self.run_from(idx + 1, scope, work)),
        }
    }
}

impl fmt::Debug for ChainedManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.managers.iter()).finish()
    }
}
