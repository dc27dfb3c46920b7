//! Transaction coordination engine for txscope
//!
//! This crate turns the vocabulary of `txscope-core` into behaviour:
//! - Propagation engine: `decide(propagation, has_existing) -> Action`
//! - Manager: begin/join/nest/suppress, finalize, error wrapping, panic safety
//! - Observers: lifecycle event hooks with a `tracing` sink
//! - Metrics: relaxed counters per manager
//! - Config: `txscope.toml` loading into `Settings`
//! - ChainedManager: one unit of work across several resources
//!
//! The engine knows nothing about any concrete resource; adapters plug in
//! through `TransactionFactory`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod config;
pub mod manager;
pub mod metrics;
pub mod observer;
pub mod propagation;

pub use chain::ChainedManager;
pub use config::{ConfigError, ManagerConfig, CONFIG_FILE_NAME};
pub use manager::{Manager, ManagerBuilder};
pub use metrics::ManagerMetrics;
pub use observer::{Event, EventKind, Observer, TracingObserver};
pub use propagation::{decide, Action};
