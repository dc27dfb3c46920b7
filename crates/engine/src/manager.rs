//! Transaction manager
//!
//! `Manager::run` is the single entry point application code uses:
//!
//! ```text
//! caller ctx ──► decide(propagation, existing?) ──► Fail      → PropagationViolation
//!                                               ├─► Join      → work(ctx)
//!                                               ├─► Suppress  → work(ctx, key shadowed)
//!                                               └─► New/Nested→ begin → work(scope) → commit | rollback
//! ```
//!
//! The caller's context is never modified. The transaction begun for a
//! New/Nested call is registered on a derived context that only the work
//! closure sees, so once `run` returns the caller observes exactly the
//! transaction it had before.

use crate::config::{ConfigError, ManagerConfig};
use crate::metrics::{ManagerMetrics, MetricsRecorder};
use crate::observer::{notify, Event, EventKind, Observer};
use crate::propagation::{decide, Action};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};
use txscope_core::{
    current_transaction_by_key, with_transaction, without_transaction, BoxError, Context, Error,
    Propagation, Result, Settings, TransactionFactory, TransactionHandle, TransactionId,
};

/// Coordinates transactions for one resource
///
/// Thread safety: `Manager` is `Send + Sync`; independent call chains may
/// share one instance.
pub struct Manager {
    factory: Arc<dyn TransactionFactory>,
    settings: Settings,
    observers: Vec<Arc<dyn Observer>>,
    metrics: MetricsRecorder,
}

impl Manager {
    /// Create a manager with default settings
    pub fn new<F: TransactionFactory + 'static>(factory: F) -> Self {
        Self::builder(factory).build()
    }

    /// Create a manager with the given default settings
    pub fn with_settings<F: TransactionFactory + 'static>(factory: F, settings: Settings) -> Self {
        Self::builder(factory).settings(settings).build()
    }

    /// Start building a manager
    pub fn builder<F: TransactionFactory + 'static>(factory: F) -> ManagerBuilder {
        ManagerBuilder::new(Arc::new(factory))
    }

    /// Default settings used by [`Manager::run`]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Snapshot of this manager's counters
    pub fn metrics(&self) -> ManagerMetrics {
        self.metrics.snapshot()
    }

    /// Run `work` under the manager's default settings
    ///
    /// # Example
    /// ```
    /// # use std::any::Any;
    /// # use std::sync::Arc;
    /// # use std::sync::atomic::{AtomicBool, Ordering};
    /// # use txscope_core::*;
    /// # use txscope_engine::Manager;
    /// # #[derive(Debug, Default)]
    /// # struct Tx(AtomicBool);
    /// # impl Transaction for Tx {
    /// #     fn commit(&self, _: &Context) -> std::result::Result<(), BoxError> { self.0.store(true, Ordering::SeqCst); Ok(()) }
    /// #     fn rollback(&self, _: &Context) -> std::result::Result<(), BoxError> { self.0.store(true, Ordering::SeqCst); Ok(()) }
    /// #     fn is_active(&self) -> bool { !self.0.load(Ordering::SeqCst) }
    /// #     fn as_any(&self) -> &dyn Any { self }
    /// # }
    /// # let factory = |_: &Context, _: &Settings, _: Option<&Arc<dyn Transaction>>|
    /// #     -> std::result::Result<Arc<dyn Transaction>, BoxError> { Ok(Arc::new(Tx::default())) };
    /// let manager = Manager::new(factory);
    /// let ctx = Context::background();
    ///
    /// let answer = manager.run(&ctx, |scope| {
    ///     assert!(current_transaction(scope).is_some());
    ///     Ok::<_, BoxError>(42)
    /// })?;
    ///
    /// assert_eq!(answer, 42);
    /// assert!(current_transaction(&ctx).is_none());
    /// # Ok::<(), txscope_core::Error>(())
    /// ```
    pub fn run<T, E, F>(&self, ctx: &Context, work: F) -> Result<T>
    where
        F: FnOnce(&Context) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        self.run_with(ctx, &self.settings, work)
    }

    /// Run `work` under explicit settings
    ///
    /// # Errors
    /// - `PropagationViolation`: `Mandatory` without / `Never` with a
    ///   transaction; work never runs
    /// - `Cancelled`: a transaction had to begin on a cancelled context
    /// - `Begin`, `Commit`: adapter failures
    /// - `RolledBack`, `RollbackFailed`: work failed in an owned transaction
    /// - `Work` (or the work's own txscope error): work failed while joined
    ///   or without a transaction
    ///
    /// # Panics
    /// A panic inside `work` is resumed after the owned transaction (if any)
    /// has been rolled back.
    pub fn run_with<T, E, F>(&self, ctx: &Context, settings: &Settings, work: F) -> Result<T>
    where
        F: FnOnce(&Context) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        let key = settings.ctx_key();
        let propagation = settings.propagation();
        let existing = current_transaction_by_key(ctx, key);
        let action = decide(propagation, existing.is_some());

        debug!(
            target: "txscope::manager",
            %propagation,
            ?action,
            key = %key,
            existing = ?existing.as_ref().map(|h| h.id()),
            "Propagation decided"
        );

        match action {
            Action::Fail => {
                warn!(
                    target: "txscope::manager",
                    %propagation,
                    existing = existing.is_some(),
                    "Propagation violated"
                );
                Err(Error::PropagationViolation {
                    propagation,
                    existing: existing.is_some(),
                })
            }
            Action::Join => {
                self.metrics.record_joined();
                work(ctx).map_err(|e| Error::from_work(e.into()))
            }
            Action::Suppress => {
                self.metrics.record_suppressed();
                let scope = if existing.is_some() {
                    without_transaction(ctx, key)
                } else {
                    ctx.clone()
                };
                work(&scope).map_err(|e| Error::from_work(e.into()))
            }
            Action::New => self.run_owned(ctx, settings, None, work),
            Action::Nested => self.run_owned(ctx, settings, existing, work),
        }
    }

    fn run_owned<T, E, F>(
        &self,
        ctx: &Context,
        settings: &Settings,
        parent: Option<TransactionHandle>,
        work: F,
    ) -> Result<T>
    where
        F: FnOnce(&Context) -> std::result::Result<T, E>,
        E: Into<BoxError>,
    {
        if let Some(reason) = ctx.cancel_reason() {
            debug!(target: "txscope::manager", %reason, "Context cancelled before begin");
            return Err(Error::Cancelled(reason));
        }

        let mut scope = if settings.cancelable() {
            ctx.clone()
        } else {
            ctx.without_cancel()
        };
        if let Some(timeout) = settings.timeout() {
            scope = scope.with_timeout(timeout);
        }

        let id = TransactionId::next();
        let propagation = settings.propagation();
        let depth = parent.as_ref().map_or(0, |p| p.depth() + 1);

        let tx = match self
            .factory
            .begin(&scope, settings, parent.as_ref().map(|p| p.transaction()))
        {
            Ok(tx) => tx,
            Err(e) => {
                self.metrics.record_begin_failure();
                warn!(target: "txscope::manager", txn = %id, error = %e, "Begin failed");
                self.emit(&Event::new(EventKind::Error, id, propagation, depth).with_cause(&*e));
                return Err(Error::Begin(e));
            }
        };

        let handle = TransactionHandle::new(id, settings.ctx_key(), propagation, tx, parent);
        let _active = self.metrics.record_started();
        debug!(
            target: "txscope::manager",
            txn = %id,
            %propagation,
            depth,
            "Transaction begun"
        );
        self.emit(&Event::new(EventKind::Begin, id, propagation, depth));

        let scope = with_transaction(&scope, settings.ctx_key(), handle.clone());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&scope)));

        match outcome {
            Ok(Ok(value)) => {
                self.commit(&scope, &handle)?;
                Ok(value)
            }
            Ok(Err(e)) => Err(self.rollback(&scope, &handle, e.into())),
            Err(payload) => {
                warn!(target: "txscope::manager", txn = %id, "Work panicked; rolling back");
                if let Err(e) = handle.rollback(&scope) {
                    self.metrics.record_rollback_failure();
                    warn!(
                        target: "txscope::manager",
                        txn = %id,
                        error = %e,
                        "Rollback after panic failed"
                    );
                    self.emit(&self.event(EventKind::Error, &handle).with_cause(&*e));
                } else {
                    self.metrics.record_rolled_back();
                    self.emit(&self.event(EventKind::Rollback, &handle));
                }
                panic::resume_unwind(payload)
            }
        }
    }

    fn commit(&self, ctx: &Context, handle: &TransactionHandle) -> Result<()> {
        match handle.commit(ctx) {
            Ok(()) => {
                self.metrics.record_committed();
                info!(target: "txscope::manager", txn = %handle.id(), depth = handle.depth(), "Transaction committed");
                self.emit(&self.event(EventKind::Commit, handle));
                Ok(())
            }
            Err(e) => {
                self.metrics.record_commit_failure();
                warn!(target: "txscope::manager", txn = %handle.id(), error = %e, "Commit failed");
                self.emit(&self.event(EventKind::Error, handle).with_cause(&*e));

                if handle.is_active() {
                    match handle.rollback(ctx) {
                        Ok(()) => {
                            self.metrics.record_rolled_back();
                            debug!(
                                target: "txscope::manager",
                                txn = %handle.id(),
                                "Rolled back after failed commit"
                            );
                            self.emit(&self.event(EventKind::Rollback, handle).with_cause(&*e));
                        }
                        Err(rb) => {
                            self.metrics.record_rollback_failure();
                            warn!(
                                target: "txscope::manager",
                                txn = %handle.id(),
                                error = %rb,
                                "Rollback after failed commit also failed"
                            );
                            self.emit(&self.event(EventKind::Error, handle).with_cause(&*rb));
                        }
                    }
                }
                Err(Error::Commit(e))
            }
        }
    }

    fn rollback(&self, ctx: &Context, handle: &TransactionHandle, work: BoxError) -> Error {
        match handle.rollback(ctx) {
            Ok(()) => {
                self.metrics.record_rolled_back();
                info!(
                    target: "txscope::manager",
                    txn = %handle.id(),
                    depth = handle.depth(),
                    cause = %work,
                    "Transaction rolled back"
                );
                self.emit(&self.event(EventKind::Rollback, handle).with_cause(&*work));
                Error::RolledBack(work)
            }
            Err(rollback) => {
                self.metrics.record_rollback_failure();
                warn!(
                    target: "txscope::manager",
                    txn = %handle.id(),
                    error = %rollback,
                    cause = %work,
                    "Rollback failed"
                );
                self.emit(&self.event(EventKind::Error, handle).with_cause(&*rollback));
                Error::RollbackFailed { work, rollback }
            }
        }
    }

    fn event<'a>(&self, kind: EventKind, handle: &TransactionHandle) -> Event<'a> {
        Event::new(kind, handle.id(), handle.propagation(), handle.depth())
    }

    fn emit(&self, event: &Event<'_>) {
        notify(&self.observers, event);
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("settings", &self.settings)
            .field("observers", &self.observers.len())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

/// Builder for [`Manager`]
pub struct ManagerBuilder {
    factory: Arc<dyn TransactionFactory>,
    settings: Settings,
    observers: Vec<Arc<dyn Observer>>,
}

impl ManagerBuilder {
    /// Start from a shared factory
    pub fn new(factory: Arc<dyn TransactionFactory>) -> Self {
        Self {
            factory,
            settings: Settings::default(),
            observers: Vec::new(),
        }
    }

    /// Replace the default settings
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the default propagation mode
    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.settings = self.settings.with_propagation(propagation);
        self
    }

    /// Set the registry key
    pub fn ctx_key(mut self, key: txscope_core::ContextKey) -> Self {
        self.settings = self.settings.with_ctx_key(key);
        self
    }

    /// Take default settings from a config file's contents
    ///
    /// # Errors
    /// Any invalid value in `config`.
    pub fn config(mut self, config: &ManagerConfig) -> std::result::Result<Self, ConfigError> {
        self.settings = config.to_settings()?;
        Ok(self)
    }

    /// Register an observer
    pub fn observer<O: Observer + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Register a shared observer
    pub fn shared_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Build the manager
    pub fn build(self) -> Manager {
        Manager {
            factory: self.factory,
            settings: self.settings,
            observers: self.observers,
            metrics: MetricsRecorder::default(),
        }
    }
}
