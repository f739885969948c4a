// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interval-temporal operators (olap, sw, ew, dur, eq) over the cross
//! product of two grouped operand lists.

use log::trace;

use crate::core::error::{EngineError, EngineResult};
use crate::core::event::{EventGroup, Instance, InstanceList};
use crate::core::processor::{EvalContext, ModelProcessor, ResolveCaller};
use crate::core::time::Time;
use crate::core::tree::{IntervalOp, NodeId, OpConstraint};

/// One pair check over the operands' `(start, end)` boundaries.
fn interval_holds(
    op: IntervalOp,
    phi1_start: Time,
    phi1_end: Time,
    phi2_start: Time,
    phi2_end: Time,
    op_constraint: Option<OpConstraint>,
) -> bool {
    match op {
        // Overlap keeps its default shape and additionally bounds the
        // overlap width when a constraint is present.
        IntervalOp::Overlap => {
            let default = phi2_start < phi1_start && phi1_start < phi2_end && phi1_end > phi2_end;
            match op_constraint {
                Some(c) => default && c.relop.holds(phi2_end, phi1_start + c.delta),
                None => default,
            }
        }
        IntervalOp::StartsWith => match op_constraint {
            Some(c) => c.relop.holds(phi1_start, phi2_start + c.delta),
            None => phi1_start == phi2_start,
        },
        IntervalOp::EndsWith => match op_constraint {
            Some(c) => c.relop.holds(phi1_end, phi2_end + c.delta),
            None => phi1_end == phi2_end,
        },
        IntervalOp::Equals => {
            let d1 = phi1_end.since(phi1_start);
            let d2 = phi2_end.since(phi2_start);
            match op_constraint {
                Some(c) => c.relop.holds(d1, c.delta) && c.relop.holds(d2, c.delta),
                None => d1 == d2,
            }
        }
        IntervalOp::During => {
            let d1 = phi1_end.since(phi1_start);
            let d2 = phi2_end.since(phi2_start);
            match op_constraint {
                Some(c) => c.relop.holds(d1, c.delta) && c.relop.holds(d2, c.delta),
                None => phi1_start > phi2_start && phi1_end < phi2_end,
            }
        }
    }
}

impl ModelProcessor {
    pub(super) fn process_interval(
        &mut self,
        ctx: &mut EvalContext<'_>,
        node_id: NodeId,
        op: IntervalOp,
        prev: Option<NodeId>,
        right_id: NodeId,
        scope: &InstanceList,
    ) -> EngineResult<InstanceList> {
        self.states.flush_cache();

        let left = prev
            .and_then(|p| ctx.result(p).cloned())
            .unwrap_or_default();
        let right = self.process_operand(ctx, right_id, scope, scope, ResolveCaller::Other)?;
        ctx.set_result(right_id, right.clone());

        // Interval relations are defined over time ranges, so both operand
        // lists must hold grouped instances.
        if !left.is_empty() && !right.is_empty() {
            let grouped = matches!(left.first(), Some(Instance::Group(_)))
                && matches!(right.first(), Some(Instance::Group(_)));
            if !grouped {
                return Err(EngineError::model(format!(
                    "interval operator {op} requires grouped operands"
                )));
            }
        }

        let op_constraint = ctx.model().node(node_id).op_constraint;
        let mut out = InstanceList::with_behavior(node_id);
        for phi1 in &left {
            for phi2 in &right {
                if phi1.same_events(phi2) {
                    continue;
                }
                if interval_holds(
                    op,
                    phi1.start(),
                    phi1.end(),
                    phi2.start(),
                    phi2.end(),
                    op_constraint,
                ) {
                    let mut group = EventGroup::with_behavior(node_id);
                    group.add(phi1.clone());
                    group.add(phi2.clone());
                    out.insert(Instance::Group(group));
                }
            }
        }
        trace!("interval {op}: {} satisfying pairs", out.len());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(sec: i64) -> Time {
        Time::new(sec, 0)
    }

    #[test]
    fn overlap_requires_straddled_boundaries() {
        // phi2: [0, 10), phi1: [5, 15) overlaps.
        assert!(interval_holds(IntervalOp::Overlap, t(5), t(15), t(0), t(10), None));
        // Disjoint ranges do not.
        assert!(!interval_holds(IntervalOp::Overlap, t(20), t(30), t(0), t(10), None));
        // Containment is not overlap.
        assert!(!interval_holds(IntervalOp::Overlap, t(2), t(8), t(0), t(10), None));
    }

    #[test]
    fn starts_with_and_ends_with_compare_boundaries() {
        assert!(interval_holds(IntervalOp::StartsWith, t(3), t(9), t(3), t(7), None));
        assert!(!interval_holds(IntervalOp::StartsWith, t(3), t(9), t(4), t(7), None));
        assert!(interval_holds(IntervalOp::EndsWith, t(3), t(9), t(5), t(9), None));
        assert!(!interval_holds(IntervalOp::EndsWith, t(3), t(9), t(5), t(8), None));
    }

    #[test]
    fn during_requires_strict_containment() {
        assert!(interval_holds(IntervalOp::During, t(4), t(8), t(0), t(10), None));
        assert!(!interval_holds(IntervalOp::During, t(0), t(8), t(0), t(10), None));
    }

    #[test]
    fn equals_is_symmetric() {
        for (a, b) in [((0, 10), (5, 15)), ((0, 10), (5, 12)), ((3, 3), (9, 9))] {
            let forward = interval_holds(
                IntervalOp::Equals,
                t(a.0),
                t(a.1),
                t(b.0),
                t(b.1),
                None,
            );
            let backward = interval_holds(
                IntervalOp::Equals,
                t(b.0),
                t(b.1),
                t(a.0),
                t(a.1),
                None,
            );
            assert_eq!(forward, backward);
        }
    }
}
