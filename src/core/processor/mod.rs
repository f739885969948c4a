// SPDX-License-Identifier: MIT OR Apache-2.0

//! The behavior evaluator: a recursive walk over the behavior tree that
//! dispatches leaf states to the state processor and operator nodes to the
//! logical, linear-temporal, and interval-temporal processors, threading
//! instance lists between siblings.
//!
//! The tree is never mutated during a run. Per-run results live in an
//! [`EvalContext`] keyed by node identity, so one parsed model can be
//! evaluated any number of times.

pub mod constraint;
mod interval;
mod logical;
mod model;
mod resolver;
mod state;
mod temporal;

use std::collections::HashMap;

use crate::core::config::EngineConfig;
use crate::core::event::InstanceList;
use crate::core::state::StateManager;
use crate::core::store::{DataManager, EventStore};
use crate::core::symbol::SymbolTable;
use crate::core::tree::{Model, NodeId};

pub use model::ModelOutcome;
pub use resolver::{ResolveCaller, ResolvedState};

/// Per-run evaluation state: maps each node to the instance list it matched
/// during the current run.
pub struct EvalContext<'m> {
    model: &'m Model,
    results: HashMap<NodeId, InstanceList>,
}

impl<'m> EvalContext<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self {
            model,
            results: HashMap::new(),
        }
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn result(&self, id: NodeId) -> Option<&InstanceList> {
        self.results.get(&id)
    }

    pub fn set_result(&mut self, id: NodeId, result: InstanceList) {
        self.results.insert(id, result);
    }
}

/// Applies parsed models to an event store.
pub struct ModelProcessor {
    data: DataManager,
    states: StateManager,
    symbols: SymbolTable,
    config: EngineConfig,
    /// Ids matched by the current qualifier; every later state query in the
    /// epoch is restricted to them.
    qualifying_ids: Option<Vec<u64>>,
}

impl ModelProcessor {
    pub fn new(store: Box<dyn EventStore>, symbols: SymbolTable, config: EngineConfig) -> Self {
        let data = DataManager::new(store, config.query_cache_capacity);
        Self {
            data,
            states: StateManager::new(),
            symbols,
            config,
            qualifying_ids: None,
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }
}
