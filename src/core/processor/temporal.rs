// SPDX-License-Identifier: MIT OR Apache-2.0

//! Linear-temporal leads-to (`~>`) processing.

use log::trace;

use crate::core::error::{EngineError, EngineResult};
use crate::core::event::{EventGroup, Instance, InstanceList};
use crate::core::processor::{EvalContext, ModelProcessor, ResolveCaller};
use crate::core::time::Time;
use crate::core::tree::{NodeId, OpConstraint};

/// Success predicate for one `(phi1, phi2)` pair: by default the successor
/// starts at or after the predecessor's logical end; with an operator
/// constraint the start is compared against the end shifted by the delta.
fn leadsto_holds(t1_end: Time, t2_start: Time, op_constraint: Option<OpConstraint>) -> bool {
    match op_constraint {
        Some(c) => c.relop.holds(t2_start, t1_end + c.delta),
        None => t2_start >= t1_end,
    }
}

impl ModelProcessor {
    pub(super) fn process_leadsto(
        &mut self,
        ctx: &mut EvalContext<'_>,
        node_id: NodeId,
        prev: Option<NodeId>,
        right_id: NodeId,
    ) -> EngineResult<InstanceList> {
        self.states.flush_cache();

        let left = prev
            .and_then(|p| ctx.result(p).cloned())
            .ok_or_else(|| EngineError::model("leads-to operator has no left operand"))?;

        // The successor search is driven by the predecessor's matches, both
        // for dependent trigger iteration and for nested behaviors.
        let right =
            self.process_operand(ctx, right_id, &left, &left, ResolveCaller::LeadsTo)?;
        ctx.set_result(right_id, right.clone());

        let op_constraint = ctx.model().node(node_id).op_constraint;
        Self::apply_leadsto_semantics(node_id, &left, &right, op_constraint)
    }

    fn apply_leadsto_semantics(
        node_id: NodeId,
        left: &InstanceList,
        right: &InstanceList,
        op_constraint: Option<OpConstraint>,
    ) -> EngineResult<InstanceList> {
        let mut out = InstanceList::with_behavior(node_id);
        if left.is_empty() || right.is_empty() {
            return Ok(out);
        }

        // A dependee pointer on the successors means they were resolved as a
        // dependent state; pairing is then exact rather than positional.
        let phi2_dependent = right
            .first()
            .map(|i| i.dependee().is_some())
            .unwrap_or(false);
        let phi1_dependent = left
            .first()
            .map(|i| i.dependee().is_some())
            .unwrap_or(false);

        if phi2_dependent {
            trace!("leads-to pairing: successors are dependent");
            for phi2 in right {
                let Some(phi1) = phi2.dependee().cloned() else {
                    continue;
                };
                if phi1.same_events(phi2) {
                    continue;
                }
                if leadsto_holds(phi1.logical_end(), phi2.start(), op_constraint) {
                    let mut group = match phi2 {
                        Instance::Group(g) => g.clone(),
                        Instance::Event(ev) => {
                            EventGroup::from_children([Instance::Event(ev.clone())])
                        }
                    };
                    group.add(phi1);
                    group.set_behavior(Some(node_id));
                    group.set_dependee(None);
                    out.insert(Instance::Group(group));
                }
            }
        } else if !phi1_dependent {
            trace!("leads-to pairing: both operands independent, greedy scan");
            let right_items = right.items();
            let mut cursor = 0;
            for phi1 in left {
                let mut k = cursor;
                while k < right_items.len() {
                    let phi2 = &right_items[k];
                    if phi1.same_events(phi2) {
                        k += 1;
                        continue;
                    }
                    if leadsto_holds(phi1.logical_end(), phi2.start(), op_constraint) {
                        let mut group = match phi2 {
                            Instance::Group(g) => g.clone(),
                            Instance::Event(ev) => {
                                EventGroup::from_children([Instance::Event(ev.clone())])
                            }
                        };
                        group.add(phi1.clone());
                        group.set_behavior(Some(node_id));
                        out.insert(Instance::Group(group));
                        // Successors are never reused by a later phi1.
                        cursor = k + 1;
                        break;
                    }
                    k += 1;
                }
            }
        }
        // Dependent predecessors with independent successors pair with
        // nothing; the empty list falls through.

        Ok(out)
    }
}
