//! Manager Integration Tests
//!
//! Tests for the manager driving a real adapter (the in-memory store):
//! propagation modes, scope restoration, finalize paths, cancellation,
//! panics, observers, chained managers and configuration.

#[path = "../common/mod.rs"]
mod common;

mod chained;
mod concurrency;
mod propagation_modes;
mod scope_restoration;
