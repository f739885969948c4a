// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine error types.
//!
//! The taxonomy distinguishes failures that abort a single model from
//! failures scoped to a single record. Record-scoped conditions (resolver
//! misses, empty query results) are normal control flow and never surface
//! here; model-scoped errors propagate to the top-level runner, which
//! reports them and moves on to the next model.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed constraint key or operator. Fatal to the current model.
    #[error("syntax error: {message}")]
    Syntax { message: String },

    /// A required symbol binding is missing. Aborts the current model.
    #[error("symbol table error: symbol '{symbol}' not found")]
    SymbolTable { symbol: String },

    /// Bad value or type for a constraint.
    #[error("constraint error: {message}")]
    Constraint { message: String },

    /// Unexpected internal invariant violation. Aborts the current model.
    #[error("abort condition: {message}")]
    Abort { message: String },

    /// General model-processing failure.
    #[error("model processing failed: {message}")]
    ModelProcessing { message: String },

    /// The event-store collaborator failed.
    #[error("event store error: {message}")]
    Store { message: String },

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
        }
    }

    pub fn symbol(symbol: impl Into<String>) -> Self {
        Self::SymbolTable {
            symbol: symbol.into(),
        }
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Self::Abort {
            message: message.into(),
        }
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::ModelProcessing {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Escalation applied when a constraint fails while a model is being
    /// processed: syntax and constraint errors become model failures,
    /// symbol-table errors become aborts.
    pub fn escalate(self) -> Self {
        match self {
            Self::Syntax { message } | Self::Constraint { message } => {
                Self::ModelProcessing { message }
            }
            Self::SymbolTable { symbol } => Self::Abort {
                message: format!("symbol '{symbol}' not found"),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_maps_constraint_to_model_failure() {
        let err = EngineError::constraint("bad bcount value").escalate();
        assert!(matches!(err, EngineError::ModelProcessing { .. }));
    }

    #[test]
    fn escalation_maps_symbol_to_abort() {
        let err = EngineError::symbol("tcp.syn").escalate();
        assert!(matches!(err, EngineError::Abort { .. }));
    }
}
