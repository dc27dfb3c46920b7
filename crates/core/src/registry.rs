//! Context registry
//!
//! Maps a [`ContextKey`] to the transaction currently active for it. The
//! registry lives inside [`Context`] as a persistent list of frames; a lookup
//! walks from the newest frame and stops at the first frame for the key.
//!
//! A frame holding `None` shadows older frames for its key. That is how
//! `NotSupported` hides an outer transaction from the code it runs, and how
//! `RequiresNew` starts a root transaction while one is already active.
//!
//! Registering never mutates the input context. Scope restoration is
//! therefore structural: once `run` returns, the caller still holds its
//! original context and sees its original transaction.

use crate::context::Context;
use crate::settings::Propagation;
use crate::traits::Transaction;
use crate::types::{ContextKey, TransactionId};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

pub(crate) struct Frame {
    key: ContextKey,
    handle: Option<TransactionHandle>,
    parent: Option<Arc<Frame>>,
    depth: usize,
}

impl Frame {
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    fn lookup(&self, key: ContextKey) -> Option<&Option<TransactionHandle>> {
        let mut frame = self;
        loop {
            if frame.key == key {
                return Some(&frame.handle);
            }
            frame = frame.parent.as_deref()?;
        }
    }
}

struct HandleInner {
    id: TransactionId,
    key: ContextKey,
    propagation: Propagation,
    depth: usize,
    tx: Arc<dyn Transaction>,
    parent: Option<TransactionHandle>,
}

/// A registered transaction
///
/// Wraps the adapter's transaction together with the bookkeeping the manager
/// assigned when it began: id, registry key, propagation mode and the parent
/// handle for nested transactions. Cloning is cheap and clones compare equal
/// under [`TransactionHandle::same_as`].
///
/// Derefs to `dyn Transaction`, so `handle.is_active()` and
/// `handle.downcast_ref::<T>()` work directly.
#[derive(Clone)]
pub struct TransactionHandle {
    inner: Arc<HandleInner>,
}

impl TransactionHandle {
    /// Create a handle; depth is derived from `parent`
    pub fn new(
        id: TransactionId,
        key: ContextKey,
        propagation: Propagation,
        tx: Arc<dyn Transaction>,
        parent: Option<TransactionHandle>,
    ) -> Self {
        let depth = parent.as_ref().map_or(0, |p| p.depth() + 1);
        Self {
            inner: Arc::new(HandleInner {
                id,
                key,
                propagation,
                depth,
                tx,
                parent,
            }),
        }
    }

    /// Manager-assigned identifier
    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    /// Registry key this handle was registered under
    pub fn key(&self) -> ContextKey {
        self.inner.key
    }

    /// Propagation mode that began this transaction
    pub fn propagation(&self) -> Propagation {
        self.inner.propagation
    }

    /// Nesting depth; 0 for a root transaction
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Whether this transaction was begun nested in another
    pub fn is_nested(&self) -> bool {
        self.inner.parent.is_some()
    }

    /// Parent handle for nested transactions
    pub fn parent(&self) -> Option<&TransactionHandle> {
        self.inner.parent.as_ref()
    }

    /// The adapter's transaction
    pub fn transaction(&self) -> &Arc<dyn Transaction> {
        &self.inner.tx
    }

    /// Whether both handles wrap the same adapter transaction
    pub fn same_as(&self, other: &TransactionHandle) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.inner.tx) as *const (),
            Arc::as_ptr(&other.inner.tx) as *const (),
        )
    }
}

impl Deref for TransactionHandle {
    type Target = dyn Transaction;

    fn deref(&self) -> &Self::Target {
        &*self.inner.tx
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("propagation", &self.inner.propagation)
            .field("depth", &self.inner.depth)
            .field("tx", &self.inner.tx)
            .finish()
    }
}

/// Transaction active under the default key
pub fn current_transaction(ctx: &Context) -> Option<TransactionHandle> {
    current_transaction_by_key(ctx, ContextKey::DEFAULT)
}

/// Transaction active under `key`
///
/// Returns `None` when nothing was registered for the key or when the newest
/// frame for the key shadows it.
pub fn current_transaction_by_key(ctx: &Context, key: ContextKey) -> Option<TransactionHandle> {
    ctx.frames()
        .and_then(|frame| frame.lookup(key))
        .and_then(|slot| slot.clone())
}

/// Derive a context in which `handle` is current for `key`
///
/// # Example
/// ```
/// # use std::any::Any;
/// # use std::sync::Arc;
/// # use txscope_core::*;
/// # #[derive(Debug)]
/// # struct Noop;
/// # impl Transaction for Noop {
/// #     fn commit(&self, _: &Context) -> std::result::Result<(), BoxError> { Ok(()) }
/// #     fn rollback(&self, _: &Context) -> std::result::Result<(), BoxError> { Ok(()) }
/// #     fn is_active(&self) -> bool { true }
/// #     fn as_any(&self) -> &dyn Any { self }
/// # }
/// let key = ContextKey::new();
/// let handle = TransactionHandle::new(
///     TransactionId::next(),
///     key,
///     Propagation::Required,
///     Arc::new(Noop),
///     None,
/// );
/// let outer = Context::background();
/// let inner = with_transaction(&outer, key, handle.clone());
///
/// assert!(current_transaction_by_key(&inner, key).unwrap().same_as(&handle));
/// assert!(current_transaction_by_key(&outer, key).is_none());
/// assert!(current_transaction(&inner).is_none());
/// ```
pub fn with_transaction(ctx: &Context, key: ContextKey, handle: TransactionHandle) -> Context {
    push(ctx, key, Some(handle))
}

/// Derive a context in which no transaction is current for `key`
pub fn without_transaction(ctx: &Context, key: ContextKey) -> Context {
    push(ctx, key, None)
}

fn push(ctx: &Context, key: ContextKey, handle: Option<TransactionHandle>) -> Context {
    let parent = ctx.frames().cloned();
    let depth = parent.as_ref().map_or(0, |p| p.depth) + 1;
    ctx.with_frames(Arc::new(Frame {
        key,
        handle,
        parent,
        depth,
    }))
}
