// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event store collaborator surface.
//!
//! The evaluator talks to any indexed, queryable store through the
//! [`EventStore`] trait; [`MemoryEventStore`] is the in-memory reference
//! implementation and the fixture store for tests. [`DataManager`] wraps a
//! store with the per-epoch query cache.

pub mod data;
pub mod memory;

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::core::error::EngineResult;
use crate::core::event::{Event, EventGroup};

pub use data::DataManager;
pub use memory::MemoryEventStore;

/// Per-attribute comparison in a resolved predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredOp {
    Eq,
    Ne,
    Glob,
    NotGlob,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredTerm {
    pub attr: String,
    pub op: PredOp,
    /// Rendered comparison value; glob terms carry the raw pattern.
    pub value: String,
}

impl PredTerm {
    pub fn new(attr: impl Into<String>, op: PredOp, value: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            op,
            value: value.into(),
        }
    }
}

/// A fully resolved attribute predicate, ready to hand to the store.
///
/// The canonical rendering doubles as the query-cache key, so it must be
/// deterministic: the id restriction renders first (it is also the clause a
/// backing index serves best), then terms in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub terms: Vec<PredTerm>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, term: PredTerm) {
        self.terms.push(term);
    }

    pub fn render(&self, restrict_ids: Option<&[u64]>) -> String {
        let mut out = String::new();
        if let Some(ids) = restrict_ids {
            out.push_str("id IN (");
            for (i, id) in ids.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{id}");
            }
            out.push(')');
        }
        for term in &self.terms {
            if !out.is_empty() {
                out.push_str(" AND ");
            }
            let op = match term.op {
                PredOp::Eq => "=",
                PredOp::Ne => "!=",
                PredOp::Glob => "GLOB",
                PredOp::NotGlob => "NOT GLOB",
            };
            let _ = write!(out, "{} {} '{}'", term.attr, op, term.value);
        }
        out
    }
}

/// Any indexed, queryable event store the evaluator can run against.
pub trait EventStore {
    /// Events matching every term of `predicate`, optionally restricted to
    /// an id set, returned time-sorted.
    fn matching_instances(
        &self,
        predicate: &Predicate,
        restrict_ids: Option<&[u64]>,
    ) -> EngineResult<EventGroup>;

    fn event(&self, id: u64) -> EngineResult<Option<Event>>;

    /// Attribute schema discovery for one event type.
    fn attribute_names(&self, event_type: &str) -> Vec<String>;

    fn event_types(&self) -> Vec<String>;
}
