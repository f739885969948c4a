// SPDX-License-Identifier: MIT OR Apache-2.0

//! Behavior evaluation engine.
//!
//! Evaluates declarative temporal/logical behavior models — trees of atomic
//! state propositions joined by logical, linear-temporal and
//! interval-temporal operators, with quantitative constraints — against a
//! time-ordered event log, producing the event groupings that satisfy each
//! model.
//!
//! The entry point is [`core::processor::ModelProcessor`]: construct it with
//! an [`core::store::EventStore`], a [`core::symbol::SymbolTable`] and an
//! [`core::config::EngineConfig`], then call
//! [`core::processor::ModelProcessor::process_model`] with a
//! [`core::tree::Model`].

pub mod core;

pub use crate::core::config::EngineConfig;
pub use crate::core::error::{EngineError, EngineResult};
pub use crate::core::processor::ModelProcessor;

/// Initialize the `env_logger` backend for the `log` facade.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env().try_init();
}
