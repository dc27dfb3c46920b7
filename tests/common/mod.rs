//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a test's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use parking_lot::Mutex;
use std::sync::{Arc, Once};
pub use txscope::{
    current_transaction, current_transaction_by_key, BoxError, Context, ContextKey, Error,
    ErrorKind, Event, EventKind, Manager, Observer, Propagation, Settings, Transaction,
    TransactionHandle,
};
pub use txscope_memory::{
    session_from, session_from_key, MemoryConfig, MemoryError, MemoryFactory, MemoryStore,
    MemoryTransaction, NestingKind,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

// ============================================================================
// Errors
// ============================================================================

/// Business error returned by work closures
#[derive(Debug, PartialEq, Eq)]
pub struct TestError(pub &'static str);

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "test error: {}", self.0)
    }
}

impl std::error::Error for TestError {}

// ============================================================================
// TestEnv - store + manager
// ============================================================================

/// A memory store with a manager on top
pub struct TestEnv {
    pub store: MemoryStore,
    pub manager: Manager,
    pub events: Arc<Mutex<Vec<(EventKind, usize)>>>,
}

impl TestEnv {
    /// Default adapter config and default settings
    pub fn new() -> Self {
        Self::with(MemoryConfig::default(), Settings::default())
    }

    /// Default adapter config and the given propagation
    pub fn with_propagation(propagation: Propagation) -> Self {
        Self::with(
            MemoryConfig::default(),
            Settings::default().with_propagation(propagation),
        )
    }

    /// Explicit adapter config and settings
    pub fn with(config: MemoryConfig, settings: Settings) -> Self {
        init_tracing();
        let store = MemoryStore::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let manager = Manager::builder(MemoryFactory::with_config(store.clone(), config))
            .settings(settings)
            .observer(move |e: &Event<'_>| sink.lock().push((e.kind, e.depth)))
            .observer(txscope::TracingObserver)
            .build();
        Self {
            store,
            manager,
            events,
        }
    }

    /// Event kinds observed so far
    pub fn event_kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|(k, _)| *k).collect()
    }
}

/// Settings with only the propagation changed
pub fn settings(propagation: Propagation) -> Settings {
    Settings::default().with_propagation(propagation)
}

/// Current transaction's id under the default key, for before/after checks
pub fn current_id(ctx: &Context) -> Option<txscope::TransactionId> {
    current_transaction(ctx).map(|h| h.id())
}

/// Run `f` inside a fresh Required transaction and return its result
pub fn within_transaction<T>(env: &TestEnv, f: impl FnOnce(&Context) -> T) -> T {
    let mut out = None;
    env.manager
        .run_with(&Context::background(), &settings(Propagation::Required), |scope| {
            out = Some(f(scope));
            Ok::<_, TestError>(())
        })
        .unwrap();
    out.unwrap()
}
