//! Adapter contract
//!
//! A resource adapter (database driver, message broker, in-memory store)
//! plugs into the manager by implementing two traits:
//! - [`TransactionFactory`]: begin a transaction, optionally nested in a parent
//! - [`Transaction`]: commit, roll back, report whether it is still active
//!
//! The manager never inspects the resource itself. Work closures that need
//! adapter-specific API downcast the current transaction through
//! [`Transaction::as_any`].
//!
//! Thread safety: handles are shared through `Arc` and may be finalized from
//! any thread, so both traits require `Send + Sync`.

use crate::context::Context;
use crate::error::BoxError;
use crate::settings::Settings;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A transaction begun on some resource
pub trait Transaction: Any + Send + Sync + fmt::Debug {
    /// Make the transaction's effects durable
    ///
    /// For a nested transaction this releases its savepoint (or does nothing
    /// when it shares the parent's session); the parent still decides.
    ///
    /// # Errors
    /// Any resource failure. The manager reports it as a commit failure.
    fn commit(&self, ctx: &Context) -> Result<(), BoxError>;

    /// Discard the transaction's effects
    ///
    /// # Errors
    /// Any resource failure. The manager reports it alongside the work error.
    fn rollback(&self, ctx: &Context) -> Result<(), BoxError>;

    /// Whether the transaction can still be committed or rolled back
    fn is_active(&self) -> bool;

    /// Upcast for adapter-specific downcasting
    fn as_any(&self) -> &dyn Any;
}

impl dyn Transaction {
    /// Downcast to the adapter's concrete transaction type
    pub fn downcast_ref<T: Transaction>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Begins transactions on a resource
pub trait TransactionFactory: Send + Sync {
    /// Begin a transaction
    ///
    /// `parent` is set for nested propagation; the adapter decides whether
    /// that means a savepoint (see [`Settings::prefer_savepoint`]) or reusing
    /// the parent's session.
    ///
    /// # Errors
    /// Any resource failure. The manager reports it as a begin failure and
    /// never invokes the work closure.
    fn begin(
        &self,
        ctx: &Context,
        settings: &Settings,
        parent: Option<&Arc<dyn Transaction>>,
    ) -> Result<Arc<dyn Transaction>, BoxError>;
}

impl<F> TransactionFactory for F
where
    F: Fn(&Context, &Settings, Option<&Arc<dyn Transaction>>) -> Result<Arc<dyn Transaction>, BoxError>
        + Send
        + Sync,
{
    fn begin(
        &self,
        ctx: &Context,
        settings: &Settings,
        parent: Option<&Arc<dyn Transaction>>,
    ) -> Result<Arc<dyn Transaction>, BoxError> {
        self(ctx, settings, parent)
    }
}
