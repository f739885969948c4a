// SPDX-License-Identifier: MIT OR Apache-2.0

//! Symbol table collaborator surface consumed by the evaluator.
//!
//! The table maps fully-qualified state names to their declared attribute
//! expressions and flags. Lookups resolve by suffix match on dotted
//! namespace paths, so `scan.s_syn` finds `net.scan.s_syn`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, EngineResult};
use crate::core::tree::{AttributeExpr, Constraint};

/// Classification of one declared attribute, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Constant,
    Wildcard,
    Independent,
    Dependent,
    Global,
    Behavior,
}

/// Declaration record for one state proposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSymbol {
    pub event_type: String,
    /// Declared attributes in declaration order.
    pub attrs: Vec<(String, AttributeExpr)>,
    pub dependent: bool,
    pub negated: bool,
    pub constraint: Option<Constraint>,
}

impl StateSymbol {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            attrs: Vec::new(),
            dependent: false,
            negated: false,
            constraint: None,
        }
    }

    pub fn attr(mut self, name: impl Into<String>, expr: AttributeExpr) -> Self {
        let expr_dependent = expr.is_dependent();
        self.attrs.push((name.into(), expr));
        if expr_dependent {
            self.dependent = true;
        }
        self
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn expr(&self, attr: &str) -> Option<&AttributeExpr> {
        self.attrs
            .iter()
            .find(|(name, _)| name == attr)
            .map(|(_, expr)| expr)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    states: HashMap<String, StateSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_state(&mut self, full_name: impl Into<String>, symbol: StateSymbol) {
        self.states.insert(full_name.into(), symbol);
    }

    /// Suffix-match lookup on dotted paths: an exact key wins, otherwise any
    /// registered key ending in `.{name}` matches.
    pub fn find_state(&self, name: &str) -> Option<&StateSymbol> {
        if let Some(sym) = self.states.get(name) {
            return Some(sym);
        }
        let suffix = format!(".{name}");
        self.states
            .iter()
            .find(|(key, _)| key.ends_with(&suffix))
            .map(|(_, sym)| sym)
    }

    pub fn state(&self, name: &str) -> EngineResult<&StateSymbol> {
        self.find_state(name)
            .ok_or_else(|| EngineError::symbol(name))
    }

    pub fn is_state_dependent(&self, name: &str) -> EngineResult<bool> {
        Ok(self.state(name)?.dependent)
    }

    pub fn is_state_negated(&self, name: &str) -> EngineResult<bool> {
        Ok(self.state(name)?.negated)
    }

    pub fn state_constraint(&self, name: &str) -> EngineResult<Option<Constraint>> {
        Ok(self.state(name)?.constraint.clone())
    }

    /// Classify a fully-qualified `namespace.state.attr` key.
    pub fn kind_of(&self, qualified_attr: &str) -> EngineResult<SymbolKind> {
        let (state_name, attr) = qualified_attr
            .rsplit_once('.')
            .ok_or_else(|| EngineError::symbol(qualified_attr))?;
        let symbol = self.state(state_name)?;
        let expr = symbol
            .expr(attr)
            .ok_or_else(|| EngineError::symbol(qualified_attr))?;
        Ok(match expr {
            AttributeExpr::Glob(p) if p == "*" => SymbolKind::Wildcard,
            AttributeExpr::Glob(_)
            | AttributeExpr::NotGlob(_)
            | AttributeExpr::Constant(_)
            | AttributeExpr::NotConstant(_) => SymbolKind::Constant,
            AttributeExpr::Independent => SymbolKind::Independent,
            AttributeExpr::Dependent(_) => SymbolKind::Dependent,
        })
    }
}
