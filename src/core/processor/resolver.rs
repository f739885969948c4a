// SPDX-License-Identifier: MIT OR Apache-2.0

//! Binds a state's declared attribute expressions to concrete values.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::core::error::EngineResult;
use crate::core::event::{AttributeValue, Event};
use crate::core::store::{PredOp, PredTerm, Predicate};
use crate::core::symbol::StateSymbol;
use crate::core::tree::AttributeExpr;

/// Who asked for the resolution. Independent attributes bind from the data
/// record for plain state processing, relax to wildcard under a leads-to
/// successor search, and are omitted from the predicate for every other
/// operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveCaller {
    State,
    LeadsTo,
    Other,
}

/// A resolved state: the store predicate plus the flat binding map recorded
/// into correlation history.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedState {
    pub predicate: Predicate,
    pub bindings: BTreeMap<String, AttributeValue>,
}

/// Resolve `symbol`'s attribute expressions against the current data record
/// and correlation history.
///
/// Returns `Ok(None)` when resolution fails for this record; the caller
/// skips the record, it never aborts the pass. A dependent reference whose
/// history key is absent falls back to the record's same-named local
/// attribute (a forward reference) before giving up.
pub fn resolve_state(
    symbol: &StateSymbol,
    full_state_name: &str,
    data_record: Option<&Event>,
    history: Option<&BTreeMap<String, AttributeValue>>,
    caller: ResolveCaller,
    quiet_forward_references: bool,
) -> EngineResult<Option<ResolvedState>> {
    let mut predicate = Predicate::new();
    let mut bindings = BTreeMap::new();
    predicate.push(PredTerm::new(
        "eventtype",
        PredOp::Eq,
        symbol.event_type.clone(),
    ));

    for (attr, expr) in &symbol.attrs {
        match expr {
            AttributeExpr::Glob(pattern) => {
                predicate.push(PredTerm::new(attr, PredOp::Glob, pattern.clone()));
                bindings.insert(attr.clone(), AttributeValue::from(pattern.clone()));
            }
            AttributeExpr::NotGlob(pattern) => {
                predicate.push(PredTerm::new(attr, PredOp::NotGlob, pattern.clone()));
                bindings.insert(attr.clone(), AttributeValue::from(pattern.clone()));
            }
            AttributeExpr::Constant(value) => {
                predicate.push(PredTerm::new(attr, PredOp::Eq, value.render()));
                bindings.insert(attr.clone(), value.clone());
            }
            AttributeExpr::NotConstant(value) => {
                predicate.push(PredTerm::new(attr, PredOp::Ne, value.render()));
                bindings.insert(attr.clone(), value.clone());
            }
            AttributeExpr::Independent => match (caller, data_record) {
                (ResolveCaller::State, Some(record)) => match record.lookup(attr) {
                    Some(value) => {
                        predicate.push(PredTerm::new(attr, PredOp::Eq, value.render()));
                        bindings.insert(attr.clone(), value);
                    }
                    None => {
                        debug!(
                            "record {} has no attribute '{attr}' for state {full_state_name}",
                            record.id()
                        );
                        return Ok(None);
                    }
                },
                (ResolveCaller::LeadsTo, _) => {
                    predicate.push(PredTerm::new(attr, PredOp::Glob, "*"));
                    bindings.insert(attr.clone(), AttributeValue::from("*"));
                }
                _ => {}
            },
            AttributeExpr::Dependent(key) => {
                let from_history = history.and_then(|h| h.get(key)).cloned();
                match from_history {
                    Some(value) => {
                        predicate.push(PredTerm::new(attr, PredOp::Eq, value.render()));
                        bindings.insert(attr.clone(), value);
                    }
                    None => {
                        // Forward reference: the referenced state has not
                        // bound yet, so fall back to the record's own value
                        // under the local attribute name.
                        let local = data_record.and_then(|r| r.lookup(attr));
                        match local {
                            Some(value) => {
                                if quiet_forward_references {
                                    debug!(
                                        "forward reference '{key}' in {full_state_name} \
                                         resolved from local attribute '{attr}'"
                                    );
                                } else {
                                    warn!(
                                        "forward reference '{key}' in {full_state_name} \
                                         resolved from local attribute '{attr}'"
                                    );
                                }
                                predicate.push(PredTerm::new(attr, PredOp::Eq, value.render()));
                                bindings.insert(attr.clone(), value);
                            }
                            None => {
                                debug!(
                                    "unresolvable reference '{key}' in {full_state_name}, \
                                     skipping record"
                                );
                                return Ok(None);
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(Some(ResolvedState {
        predicate,
        bindings,
    }))
}
