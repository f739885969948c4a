// SPDX-License-Identifier: MIT OR Apache-2.0

//! Atomic state proposition processing.

use std::collections::HashSet;

use log::{debug, trace};

use crate::core::error::{EngineError, EngineResult};
use crate::core::event::{EventGroup, Instance, InstanceList};
use crate::core::processor::resolver::{resolve_state, ResolveCaller};
use crate::core::processor::{constraint, EvalContext, ModelProcessor};
use crate::core::symbol::StateSymbol;
use crate::core::tree::NodeId;

impl ModelProcessor {
    /// Evaluate the qualifier: match its predicate over the whole store and
    /// seed one correlation record per matched event.
    pub(super) fn process_qualifier(
        &mut self,
        ctx: &mut EvalContext<'_>,
        node_id: NodeId,
    ) -> EngineResult<InstanceList> {
        let node = ctx.model().node(node_id);
        let full_name = node.full_name();
        let symbol = self.symbols.state(&full_name)?.clone();

        let resolved = resolve_state(
            &symbol,
            &full_name,
            None,
            None,
            ResolveCaller::Other,
            self.config.quiet_forward_references,
        )?
        .ok_or_else(|| EngineError::abort("qualifier predicate did not resolve"))?;
        let matches = self.data.matching_instances(&resolved.predicate, None)?;

        let mut out = InstanceList::with_behavior(node_id);
        for child in matches.children() {
            if let Some(event) = child.last_event() {
                let bindings = resolve_state(
                    &symbol,
                    &full_name,
                    Some(event),
                    None,
                    ResolveCaller::State,
                    self.config.quiet_forward_references,
                )?
                .map(|r| r.bindings)
                .unwrap_or_default();
                self.states.seed(&full_name, event.id(), bindings)?;
            }
            out.insert(child.clone());
        }
        debug!("qualifier {} matched {} instances", full_name, out.len());
        Ok(out)
    }

    /// Evaluate one state proposition against `candidates`.
    pub(super) fn process_state(
        &mut self,
        ctx: &mut EvalContext<'_>,
        node_id: NodeId,
        candidates: &InstanceList,
        caller: ResolveCaller,
    ) -> EngineResult<InstanceList> {
        let node = ctx.model().node(node_id);
        let full_name = node.full_name();
        let symbol = self.symbols.state(&full_name)?.clone();

        let result = if symbol.dependent {
            trace!("state {full_name} is dependent");
            self.process_dependent_state(node_id, &full_name, &symbol, candidates, caller)?
        } else {
            trace!("state {full_name} is independent");
            let out = self.process_independent_state(node_id, &full_name, &symbol)?;
            if !out.is_empty() {
                self.update_records(&full_name, &symbol, &out)?;
            }
            out
        };

        if symbol.negated {
            return Ok(Self::complement(node_id, candidates, &result));
        }
        debug!(
            "state {} matched {} instances",
            full_name,
            result.len()
        );
        Ok(result)
    }

    fn process_independent_state(
        &mut self,
        node_id: NodeId,
        full_name: &str,
        symbol: &StateSymbol,
    ) -> EngineResult<InstanceList> {
        let resolved = resolve_state(
            symbol,
            full_name,
            None,
            None,
            ResolveCaller::Other,
            self.config.quiet_forward_references,
        )?
        .ok_or_else(|| EngineError::symbol(full_name))?;

        let matches = self
            .data
            .matching_instances(&resolved.predicate, self.qualifying_ids.as_deref())?;
        if matches.is_empty() {
            self.states.flush_cache();
            return Ok(InstanceList::with_behavior(node_id));
        }

        if let Some(c) = &symbol.constraint {
            let mut grouped = EventGroup::with_behavior(node_id);
            for child in matches.children() {
                grouped.add(child.clone());
            }
            let mut single = InstanceList::with_behavior(node_id);
            single.insert(Instance::Group(grouped));
            let mut constrained =
                constraint::process(c, &single).map_err(EngineError::escalate)?;
            constrained.set_behavior(Some(node_id));
            Ok(constrained)
        } else {
            let mut out = InstanceList::with_behavior(node_id);
            for child in matches.children() {
                out.insert(child.clone());
            }
            Ok(out)
        }
    }

    /// Append each matched instance's resolved bindings onto its correlation
    /// record. Groups contribute their last event.
    fn update_records(
        &mut self,
        full_name: &str,
        symbol: &StateSymbol,
        instances: &InstanceList,
    ) -> EngineResult<()> {
        for instance in instances {
            let Some(event) = instance.last_event() else {
                continue;
            };
            let record_id = instance.id();
            let Some(record) = self.states.record(record_id)? else {
                continue;
            };
            let resolved = resolve_state(
                symbol,
                full_name,
                Some(event),
                Some(&record.history),
                ResolveCaller::State,
                self.config.quiet_forward_references,
            )?;
            if let Some(resolved) = resolved {
                self.states
                    .append_history(record_id, full_name, resolved.bindings)?;
            }
        }
        self.states.flush_cache();
        Ok(())
    }

    /// One transactional pass over the candidate records. Each record that
    /// resolves and matches contributes exactly one grouped result, consumes
    /// its matched event ids, and advances its correlation record.
    fn process_dependent_state(
        &mut self,
        node_id: NodeId,
        full_name: &str,
        symbol: &StateSymbol,
        candidates: &InstanceList,
        caller: ResolveCaller,
    ) -> EngineResult<InstanceList> {
        if candidates.is_empty() {
            self.states.flush_cache();
            return Ok(InstanceList::with_behavior(node_id));
        }

        let mut out = InstanceList::with_behavior(node_id);
        let mut consumed: HashSet<u64> = HashSet::new();
        self.states.begin()?;

        for trigger in candidates.iter() {
            let trigger_id = trigger.id();
            if consumed.contains(&trigger_id) {
                trace!("record {trigger_id} already consumed in this pass");
                continue;
            }
            let Some(record) = self.states.record(trigger_id)? else {
                trace!("record {trigger_id} no longer in the correlation table");
                continue;
            };
            let Some(data_record) = trigger.last_event() else {
                continue;
            };
            let Some(resolved) = resolve_state(
                symbol,
                full_name,
                Some(data_record),
                Some(&record.history),
                caller,
                self.config.quiet_forward_references,
            )?
            else {
                continue;
            };

            let matches = self
                .data
                .matching_instances(&resolved.predicate, self.qualifying_ids.as_deref())?;

            let mut pool: Vec<Instance> = matches
                .children()
                .iter()
                .filter(|c| !consumed.contains(&c.id()))
                .cloned()
                .collect();
            if caller == ResolveCaller::LeadsTo {
                // Successors must be strictly after the trigger.
                let key = trigger.sort_key();
                pool.retain(|c| c.sort_key() > key);
            }
            if pool.is_empty() {
                continue;
            }

            let group = if let Some(c) = &symbol.constraint {
                let mut single = InstanceList::new();
                single.insert(Instance::Group(EventGroup::from_children(pool)));
                let constrained =
                    constraint::process(c, &single).map_err(EngineError::escalate)?;
                match constrained.first() {
                    Some(Instance::Group(g)) if !g.is_empty() => g.clone(),
                    Some(Instance::Event(ev)) => {
                        EventGroup::from_children([Instance::Event(ev.clone())])
                    }
                    _ => continue,
                }
            } else {
                EventGroup::from_children([pool[0].clone()])
            };

            let last_event = group
                .last_event()
                .ok_or_else(|| EngineError::abort("accepted group has no events"))?;
            let last_id = last_event.id();
            let history_bindings = last_event.full_attr_map();
            for id in group.ids() {
                self.states.tombstone(id);
                consumed.insert(id);
            }
            let advanced = record.advanced(
                last_id,
                full_name,
                resolved.bindings.clone(),
                history_bindings,
            );
            self.states.persist(advanced)?;

            let mut group = group;
            group.set_behavior(Some(node_id));
            group.set_dependee(Some(trigger.clone()));
            out.insert(Instance::Group(group));
        }

        self.states.commit()?;
        self.states.flush_cache();
        Ok(out)
    }

    /// Negation: the candidates whose underlying ids are disjoint from the
    /// positive match.
    fn complement(
        node_id: NodeId,
        candidates: &InstanceList,
        positive: &InstanceList,
    ) -> InstanceList {
        let matched: HashSet<u64> = positive.ids().into_iter().collect();
        let mut out = InstanceList::with_behavior(node_id);
        for candidate in candidates {
            if candidate.ids().iter().all(|id| !matched.contains(id)) {
                out.insert(candidate.clone());
            }
        }
        out
    }
}
