//! Execution context
//!
//! A `Context` is an immutable value threaded through a call chain. Deriving a
//! context (adding a transaction frame, a deadline, a cancellation scope)
//! returns a new value and leaves the original untouched, so sibling branches
//! of a call tree never observe each other's state.
//!
//! Two things travel on a context:
//! - registry frames: which transaction is current for each manager key
//!   (see [`crate::registry`])
//! - a cancellation chain: explicit cancel flags and deadlines. Cancelling a
//!   context cancels every context derived from it; never its parents.
//!
//! Both are `Arc`-linked lists, so cloning a context is two reference-count
//! increments and lookups are lock-free.

use crate::registry::Frame;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a context is no longer live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CancelReason {
    /// A [`CancelHandle`] was triggered
    #[error("context cancelled")]
    Cancelled,
    /// A deadline on the chain has passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

struct CancelNode {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<Arc<CancelNode>>,
}

impl CancelNode {
    fn reason(&self, now: Instant) -> Option<CancelReason> {
        if self.cancelled.load(Ordering::Acquire) {
            return Some(CancelReason::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                return Some(CancelReason::DeadlineExceeded);
            }
        }
        self.parent.as_ref().and_then(|p| p.reason(now))
    }

    fn deadline(&self) -> Option<Instant> {
        let parent = self.parent.as_ref().and_then(|p| p.deadline());
        match (self.deadline, parent) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Triggers cancellation of the context it was created with
///
/// Cloning the handle shares the same flag.
#[derive(Clone)]
pub struct CancelHandle {
    node: Arc<CancelNode>,
}

impl CancelHandle {
    /// Cancel the context and all contexts derived from it
    pub fn cancel(&self) {
        self.node.cancelled.store(true, Ordering::Release);
    }

    /// Whether `cancel` has been called on this handle
    pub fn is_cancelled(&self) -> bool {
        self.node.cancelled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Immutable execution context
#[derive(Clone, Default)]
pub struct Context {
    frames: Option<Arc<Frame>>,
    cancel: Option<Arc<CancelNode>>,
}

impl Context {
    /// Root context: no transactions, never cancelled
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a cancellable context
    ///
    /// # Example
    /// ```
    /// use txscope_core::{CancelReason, Context};
    ///
    /// let (ctx, handle) = Context::background().with_cancel();
    /// let child = ctx.clone();
    /// handle.cancel();
    /// assert_eq!(child.cancel_reason(), Some(CancelReason::Cancelled));
    /// assert!(!Context::background().is_cancelled());
    /// ```
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let node = Arc::new(CancelNode {
            cancelled: AtomicBool::new(false),
            deadline: None,
            parent: self.cancel.clone(),
        });
        let ctx = Context {
            frames: self.frames.clone(),
            cancel: Some(Arc::clone(&node)),
        };
        (ctx, CancelHandle { node })
    }

    /// Derive a context that expires at `deadline`
    ///
    /// An earlier deadline already on the chain still applies.
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        Context {
            frames: self.frames.clone(),
            cancel: Some(Arc::new(CancelNode {
                cancelled: AtomicBool::new(false),
                deadline: Some(deadline),
                parent: self.cancel.clone(),
            })),
        }
    }

    /// Derive a context that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// Derive a context that keeps the registry but drops the cancellation chain
    pub fn without_cancel(&self) -> Context {
        Context {
            frames: self.frames.clone(),
            cancel: None,
        }
    }

    /// Reason this context is no longer live, if any
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancel
            .as_ref()
            .and_then(|node| node.reason(Instant::now()))
    }

    /// Whether this context has been cancelled or has expired
    pub fn is_cancelled(&self) -> bool {
        self.cancel_reason().is_some()
    }

    /// Earliest deadline on the chain
    pub fn deadline(&self) -> Option<Instant> {
        self.cancel.as_ref().and_then(|node| node.deadline())
    }

    /// Time left before the earliest deadline (zero once expired)
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn frames(&self) -> Option<&Arc<Frame>> {
        self.frames.as_ref()
    }

    pub(crate) fn with_frames(&self, frames: Arc<Frame>) -> Context {
        Context {
            frames: Some(frames),
            cancel: self.cancel.clone(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("frames", &self.frames.as_ref().map_or(0, |fr| fr.depth()))
            .field("cancel_reason", &self.cancel_reason())
            .field("deadline", &self.deadline())
            .finish()
    }
}
