//! Transactions and factory for the in-memory adapter
//!
//! Root transactions own a session. Nested transactions reuse the parent's
//! session in one of two ways:
//! - savepoint: rollback undoes only the nested writes
//! - shared: commit leaves the decision to the parent; rollback aborts the
//!   whole session, so the parent's commit will fail afterwards

use crate::error::{MemoryError, Result};
use crate::session::{Savepoint, Session};
use crate::store::MemoryStore;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;
use txscope_core::{
    current_transaction, current_transaction_by_key, BoxError, Context, ContextKey, FinalizeOp,
    FinalizePolicy, Lifecycle, Settings, Transaction, TransactionFactory, Transition,
};

/// Adapter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Honour `prefer_savepoint` for nested transactions
    #[serde(default = "default_savepoints")]
    pub savepoints: bool,
    /// How sessions treat a repeated finalize
    #[serde(default)]
    pub finalize_policy: FinalizePolicy,
}

fn default_savepoints() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            savepoints: default_savepoints(),
            finalize_policy: FinalizePolicy::default(),
        }
    }
}

#[derive(Debug)]
enum Nesting {
    Root,
    Savepoint(Savepoint, Lifecycle),
    Shared(Lifecycle),
}

/// How a [`MemoryTransaction`] relates to its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestingKind {
    /// Owns its session
    Root,
    /// Nested with its own savepoint
    Savepoint,
    /// Nested, sharing the parent's session
    Shared,
}

/// Transaction on a [`MemoryStore`]
///
/// A root transaction's state is its session's state. Nested transactions
/// carry their own [`Lifecycle`].
#[derive(Debug)]
pub struct MemoryTransaction {
    session: Arc<Session>,
    nesting: Nesting,
}

impl MemoryTransaction {
    fn root(session: Arc<Session>) -> Self {
        Self {
            session,
            nesting: Nesting::Root,
        }
    }

    fn nested(session: Arc<Session>, nesting: Nesting) -> Self {
        Self { session, nesting }
    }

    /// Session the transaction writes through
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Root, savepoint or shared
    pub fn nesting(&self) -> NestingKind {
        match self.nesting {
            Nesting::Root => NestingKind::Root,
            Nesting::Savepoint(..) => NestingKind::Savepoint,
            Nesting::Shared(_) => NestingKind::Shared,
        }
    }

    fn commit_inner(&self, ctx: &Context) -> Result<()> {
        match &self.nesting {
            Nesting::Root => self.session.commit(ctx),
            Nesting::Savepoint(savepoint, lifecycle) => {
                if lifecycle.check(FinalizeOp::Commit)? == Transition::AlreadyDone {
                    return Ok(());
                }
                self.session.check_active(FinalizeOp::Commit)?;
                self.session.release(*savepoint)?;
                lifecycle.mark(FinalizeOp::Commit);
                Ok(())
            }
            Nesting::Shared(lifecycle) => {
                if lifecycle.check(FinalizeOp::Commit)? == Transition::AlreadyDone {
                    return Ok(());
                }
                self.session.check_active(FinalizeOp::Commit)?;
                lifecycle.mark(FinalizeOp::Commit);
                Ok(())
            }
        }
    }

    // The first rollback of a nested transaction is terminal even when the
    // session refuses it.
    fn rollback_inner(&self, ctx: &Context) -> Result<()> {
        match &self.nesting {
            Nesting::Root => self.session.abort(ctx),
            Nesting::Savepoint(savepoint, lifecycle) => {
                if lifecycle.check(FinalizeOp::Rollback)? == Transition::AlreadyDone {
                    return Ok(());
                }
                let undone = if self.session.is_active() {
                    self.session.rollback_to(*savepoint)
                } else {
                    Ok(())
                };
                lifecycle.mark(FinalizeOp::Rollback);
                undone
            }
            Nesting::Shared(lifecycle) => {
                if lifecycle.check(FinalizeOp::Rollback)? == Transition::AlreadyDone {
                    return Ok(());
                }
                let aborted = self.session.abort(ctx);
                lifecycle.mark(FinalizeOp::Rollback);
                aborted
            }
        }
    }
}

impl Transaction for MemoryTransaction {
    fn commit(&self, ctx: &Context) -> std::result::Result<(), BoxError> {
        self.commit_inner(ctx).map_err(Into::into)
    }

    fn rollback(&self, ctx: &Context) -> std::result::Result<(), BoxError> {
        self.rollback_inner(ctx).map_err(Into::into)
    }

    fn is_active(&self) -> bool {
        match &self.nesting {
            Nesting::Root => self.session.is_active(),
            Nesting::Savepoint(_, lifecycle) | Nesting::Shared(lifecycle) => {
                lifecycle.is_active() && self.session.is_active()
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Session of the transaction current under the default key
pub fn session_from(ctx: &Context) -> Option<Arc<Session>> {
    current_transaction(ctx)
        .and_then(|h| h.downcast_ref::<MemoryTransaction>().map(|tx| Arc::clone(tx.session())))
}

/// Session of the transaction current under `key`
pub fn session_from_key(ctx: &Context, key: ContextKey) -> Option<Arc<Session>> {
    current_transaction_by_key(ctx, key)
        .and_then(|h| h.downcast_ref::<MemoryTransaction>().map(|tx| Arc::clone(tx.session())))
}

/// Begins [`MemoryTransaction`]s on a store
#[derive(Debug, Clone)]
pub struct MemoryFactory {
    store: MemoryStore,
    config: MemoryConfig,
}

impl MemoryFactory {
    /// Factory with default configuration
    pub fn new(store: MemoryStore) -> Self {
        Self::with_config(store, MemoryConfig::default())
    }

    /// Factory with explicit configuration
    pub fn with_config(store: MemoryStore, config: MemoryConfig) -> Self {
        Self { store, config }
    }

    /// Store this factory begins sessions on
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Adapter configuration
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn begin_inner(
        &self,
        ctx: &Context,
        settings: &Settings,
        parent: Option<&Arc<dyn Transaction>>,
    ) -> Result<MemoryTransaction> {
        let parent = match parent {
            None => {
                let session = self.store.begin_session(ctx, self.config.finalize_policy)?;
                return Ok(MemoryTransaction::root(Arc::new(session)));
            }
            Some(parent) => parent
                .downcast_ref::<MemoryTransaction>()
                .ok_or(MemoryError::ForeignParent)?,
        };

        self.store.take_begin_fault()?;
        let session = Arc::clone(parent.session());
        let lifecycle = Lifecycle::active(self.config.finalize_policy);
        let nesting = if self.config.savepoints && settings.prefer_savepoint() {
            Nesting::Savepoint(session.savepoint()?, lifecycle)
        } else {
            session.check_active(FinalizeOp::Commit)?;
            Nesting::Shared(lifecycle)
        };
        let tx = MemoryTransaction::nested(session, nesting);
        debug!(
            target: "txscope::memory",
            session = tx.session.id(),
            nesting = ?tx.nesting(),
            "Nested transaction begun"
        );
        Ok(tx)
    }
}

impl TransactionFactory for MemoryFactory {
    fn begin(
        &self,
        ctx: &Context,
        settings: &Settings,
        parent: Option<&Arc<dyn Transaction>>,
    ) -> std::result::Result<Arc<dyn Transaction>, BoxError> {
        let tx = self.begin_inner(ctx, settings, parent)?;
        Ok(Arc::new(tx))
    }
}
