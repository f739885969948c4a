// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level model walk.

use log::{debug, info, warn};

use crate::core::error::{EngineError, EngineResult};
use crate::core::event::InstanceList;
use crate::core::processor::constraint;
use crate::core::processor::{EvalContext, ModelProcessor, ResolveCaller};
use crate::core::tree::{BehaviorId, Model, NodeId, NodeKind};

/// Result of applying one model: its name and either the matched instances
/// or the error that stopped it.
pub struct ModelOutcome {
    pub model: String,
    pub result: EngineResult<InstanceList>,
}

impl ModelOutcome {
    /// JSON rendering of the outcome, the shape report sinks consume:
    /// matched instances on success, the error text otherwise.
    pub fn to_json(&self) -> String {
        let doc = match &self.result {
            Ok(instances) => serde_json::json!({
                "model": self.model,
                "instances": instances,
            }),
            Err(err) => serde_json::json!({
                "model": self.model,
                "error": err.to_string(),
            }),
        };
        doc.to_string()
    }

    /// Like [`to_json`](Self::to_json) but labels each instance with the
    /// full name of the node it matched. Generated (anonymous) names are
    /// reported as null.
    pub fn to_labeled_json(&self, model: &Model) -> String {
        let doc = match &self.result {
            Ok(instances) => {
                let labeled: Vec<serde_json::Value> = instances
                    .iter()
                    .map(|instance| {
                        let label = instance
                            .behavior()
                            .map(|id| model.node(id))
                            .filter(|node| !node.anonymous)
                            .map(|node| node.full_name());
                        serde_json::json!({
                            "behavior": label,
                            "events": instance.ids(),
                        })
                    })
                    .collect();
                serde_json::json!({ "model": self.model, "instances": labeled })
            }
            Err(err) => serde_json::json!({
                "model": self.model,
                "error": err.to_string(),
            }),
        };
        doc.to_string()
    }
}

impl ModelProcessor {
    /// Apply each model in turn. A failing model is reported and skipped;
    /// the remaining models still run.
    pub fn apply_models(&mut self, models: &[Model]) -> Vec<ModelOutcome> {
        models
            .iter()
            .map(|model| {
                info!("applying model '{}'", model.name);
                let result = self.process_model(model);
                match &result {
                    Ok(instances) => {
                        info!("model '{}' matched {} instances", model.name, instances.len())
                    }
                    Err(err) => warn!("model '{}' failed: {err}", model.name),
                }
                ModelOutcome {
                    model: model.name.clone(),
                    result,
                }
            })
            .collect()
    }

    /// Evaluate one model against the store and return the instances
    /// satisfying its root behavior.
    pub fn process_model(&mut self, model: &Model) -> EngineResult<InstanceList> {
        let mut ctx = EvalContext::new(model);
        self.qualifying_ids = None;
        let root = model.root()?;
        self.process_behavior(&mut ctx, root, &InstanceList::new(), false)
    }

    /// Recursive walk over one behavior's ordered children.
    ///
    /// `scope` tracks the qualifying instances states are evaluated against;
    /// `result` tracks the previous node's output, which operators consume
    /// as their left operand.
    pub(super) fn process_behavior(
        &mut self,
        ctx: &mut EvalContext<'_>,
        behavior_id: BehaviorId,
        input: &InstanceList,
        ignore_qualifier: bool,
    ) -> EngineResult<InstanceList> {
        let model = ctx.model();
        let behavior = model.behavior(behavior_id);
        debug!("--> behavior {} (in: {})", behavior.full_name(), input.len());
        if behavior.children.is_empty() {
            return Ok(InstanceList::new());
        }

        let mut scope = input.clone();
        let mut result = InstanceList::new();
        let mut prev: Option<NodeId> = None;
        let mut skip_next = false;

        for (index, &node_id) in behavior.children.iter().enumerate() {
            if skip_next {
                skip_next = false;
                continue;
            }
            let node = model.node(node_id);
            match node.kind {
                NodeKind::Qualifier => {
                    if ignore_qualifier {
                        prev = Some(node_id);
                        continue;
                    }
                    self.states.initialize_epoch(behavior.full_name());
                    self.data.reset_query_cache();
                    self.qualifying_ids = None;
                    let matches = self.process_qualifier(ctx, node_id)?;
                    ctx.set_result(node_id, matches.clone());
                    if matches.is_empty() {
                        debug!("qualifier {} matched nothing", node.full_name());
                        return Ok(matches);
                    }
                    self.qualifying_ids = Some(matches.instance_ids());
                    scope = matches.clone();
                    result = matches;
                    prev = Some(node_id);
                }
                NodeKind::State => {
                    let out = self.process_state(ctx, node_id, &scope, ResolveCaller::State)?;
                    ctx.set_result(node_id, out.clone());
                    if out.is_empty() && !out.is_special() {
                        debug!("no instances satisfying {}", node.full_name());
                        return Ok(out);
                    }
                    result = out;
                    prev = Some(node_id);
                }
                NodeKind::Logical(op) => {
                    let right = Self::right_operand(behavior.children.as_slice(), index, node_id)?;
                    result = self.process_logical(ctx, node_id, op, prev, right, &scope)?;
                    ctx.set_result(node_id, result.clone());
                    skip_next = true;
                    prev = Some(node_id);
                }
                NodeKind::LeadsTo => {
                    let right = Self::right_operand(behavior.children.as_slice(), index, node_id)?;
                    result = self.process_leadsto(ctx, node_id, prev, right)?;
                    ctx.set_result(node_id, result.clone());
                    skip_next = true;
                    prev = Some(node_id);
                }
                NodeKind::Interval(op) => {
                    let right = Self::right_operand(behavior.children.as_slice(), index, node_id)?;
                    result = self.process_interval(ctx, node_id, op, prev, right, &scope)?;
                    ctx.set_result(node_id, result.clone());
                    skip_next = true;
                    prev = Some(node_id);
                }
                NodeKind::Always => {
                    // Always is transparent: its operand is the remainder of
                    // the sibling list, which is already evaluated against
                    // every qualifying instance.
                    ctx.set_result(node_id, result.clone());
                }
                NodeKind::Summary => {
                    ctx.set_result(node_id, result.clone());
                }
                NodeKind::Behavior(inner) => {
                    let inner_input = if result.is_empty() { &scope } else { &result };
                    let out =
                        self.process_behavior(ctx, inner, &inner_input.clone(), ignore_qualifier)?;
                    ctx.set_result(node_id, out.clone());
                    result = out;
                    prev = Some(node_id);
                }
                NodeKind::Recursion(target) => {
                    result = self.process_recursion(ctx, node_id, target, &scope)?;
                    ctx.set_result(node_id, result.clone());
                    prev = Some(node_id);
                }
            }
        }

        if let Some(c) = &behavior.constraint {
            result = constraint::process(c, &result).map_err(EngineError::escalate)?;
            self.states.flush_cache();
        }

        debug!(
            "<-- behavior {} (out: {})",
            behavior.full_name(),
            result.len()
        );
        Ok(result)
    }

    /// Re-evaluate an enclosing behavior with the qualifier step suppressed;
    /// the correlation epoch established by the ancestor stays live.
    pub(super) fn process_recursion(
        &mut self,
        ctx: &mut EvalContext<'_>,
        node_id: NodeId,
        target: BehaviorId,
        input: &InstanceList,
    ) -> EngineResult<InstanceList> {
        let node = ctx.model().node(node_id);
        if node.op_constraint.is_some() {
            return Err(EngineError::syntax(format!(
                "operator constraints are not supported on recursion node {}",
                node.full_name()
            )));
        }
        self.states.flush_cache();
        self.process_behavior(ctx, target, input, true)
    }

    /// Evaluate the right operand of an operator node: a state, a nested
    /// behavior, or a recursion reference.
    ///
    /// `dep_candidates` is the instance list a dependent state iterates as
    /// its trigger records; independent states query the store directly and
    /// ignore it.
    pub(super) fn process_operand(
        &mut self,
        ctx: &mut EvalContext<'_>,
        operand_id: NodeId,
        dep_candidates: &InstanceList,
        scope: &InstanceList,
        caller: ResolveCaller,
    ) -> EngineResult<InstanceList> {
        let node = ctx.model().node(operand_id);
        match node.kind {
            NodeKind::State => {
                let dependent = self.symbols.is_state_dependent(&node.full_name())?;
                let candidates = if dependent { dep_candidates } else { scope };
                self.process_state(ctx, operand_id, &candidates.clone(), caller)
            }
            NodeKind::Behavior(inner) => {
                self.process_behavior(ctx, inner, &scope.clone(), false)
            }
            NodeKind::Recursion(target) => {
                self.process_recursion(ctx, operand_id, target, &dep_candidates.clone())
            }
            _ => Err(EngineError::model(format!(
                "unexpected operand {} of kind {:?}",
                node.full_name(),
                node.kind
            ))),
        }
    }

    fn right_operand(children: &[NodeId], index: usize, node_id: NodeId) -> EngineResult<NodeId> {
        children.get(index + 1).copied().ok_or_else(|| {
            EngineError::syntax(format!("operator node {node_id:?} has no right operand"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::Instance;
    use crate::core::store::memory::fixture_event;
    use crate::core::time::Time;

    #[test]
    fn outcome_renders_matches_as_json() {
        let mut list = InstanceList::new();
        list.insert(Instance::Event(fixture_event(
            1,
            "PKT_TCP",
            Time::new(10, 0),
            &[("flags", "SYN".into())],
        )));
        let outcome = ModelOutcome {
            model: "handshake".to_string(),
            result: Ok(list),
        };
        let doc: serde_json::Value = serde_json::from_str(&outcome.to_json()).unwrap();
        assert_eq!(doc["model"], "handshake");
        assert_eq!(doc["instances"]["items"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn labeled_json_skips_generated_names() {
        use crate::core::event::EventGroup;
        use crate::core::tree::Node;

        let mut model = Model::new("handshake", "net");
        let syn = model.add_node(Node::new("s_syn", "net", NodeKind::State));
        let op = model.add_node(Node::new("op1", "net", NodeKind::LeadsTo).anonymous());

        let mut named = EventGroup::with_behavior(syn);
        named.add(Instance::Event(fixture_event(
            1,
            "PKT_TCP",
            Time::new(10, 0),
            &[],
        )));
        let mut anon = EventGroup::with_behavior(op);
        anon.add(Instance::Event(fixture_event(
            2,
            "PKT_TCP",
            Time::new(11, 0),
            &[],
        )));

        let mut list = InstanceList::new();
        list.insert(Instance::Group(named));
        list.insert(Instance::Group(anon));
        let outcome = ModelOutcome {
            model: "handshake".to_string(),
            result: Ok(list),
        };

        let doc: serde_json::Value =
            serde_json::from_str(&outcome.to_labeled_json(&model)).unwrap();
        let instances = doc["instances"].as_array().unwrap();
        assert_eq!(instances[0]["behavior"], "net.s_syn");
        assert!(instances[1]["behavior"].is_null());
    }

    #[test]
    fn outcome_renders_failures_as_json() {
        let outcome = ModelOutcome {
            model: "broken".to_string(),
            result: Err(EngineError::symbol("net.s_missing")),
        };
        let doc: serde_json::Value = serde_json::from_str(&outcome.to_json()).unwrap();
        assert_eq!(doc["model"], "broken");
        assert!(doc["error"].as_str().unwrap().contains("net.s_missing"));
    }
}
