//! txscope - resource-agnostic transaction propagation
//!
//! Application code says "run this unit of work in a transaction" once; the
//! manager decides, from the propagation mode and whatever transaction is
//! already current on the context, whether to join it, start a new one, nest
//! inside it or run without one.
//!
//! # Quick Start
//!
//! ```ignore
//! use txscope::{Context, Manager, Propagation, Settings};
//!
//! let manager = Manager::new(factory);
//! let ctx = Context::background();
//!
//! manager.run(&ctx, |scope| {
//!     // nested calls see the transaction on `scope`
//!     manager.run_with(scope, &Settings::new().with_propagation(Propagation::Nested), |inner| {
//!         do_work(inner)
//!     })
//! })?;
//! ```
//!
//! # Architecture
//!
//! - `txscope-core`: context, registry, settings, adapter traits, errors
//! - `txscope-engine`: propagation engine, manager, observers, config
//!
//! Resource adapters implement `TransactionFactory` and `Transaction`.

pub use txscope_core::*;
pub use txscope_engine::*;
