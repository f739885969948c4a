// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logical operators over instance-list emptiness.
//!
//! The truth table is over emptiness rather than boolean values because the
//! payload, which instances matched, must be preserved for the next node.

use log::trace;

use crate::core::error::EngineResult;
use crate::core::event::InstanceList;
use crate::core::processor::{EvalContext, ModelProcessor, ResolveCaller};
use crate::core::tree::{LogicalOp, NodeId};

/// Truthiness for operator purposes: a special list counts as a match even
/// though it carries no events.
fn truthy(list: &InstanceList) -> bool {
    !list.is_empty() || list.is_special()
}

fn union(left: &InstanceList, right: &InstanceList) -> InstanceList {
    let mut merged = left.clone();
    merged.merge(right.clone());
    merged
}

impl ModelProcessor {
    pub(super) fn process_logical(
        &mut self,
        ctx: &mut EvalContext<'_>,
        node_id: NodeId,
        op: LogicalOp,
        prev: Option<NodeId>,
        right_id: NodeId,
        scope: &InstanceList,
    ) -> EngineResult<InstanceList> {
        self.states.flush_cache();

        let left = prev
            .and_then(|p| ctx.result(p).cloned())
            .unwrap_or_default();
        let right = self.process_operand(ctx, right_id, &left, scope, ResolveCaller::Other)?;
        ctx.set_result(right_id, right.clone());

        trace!(
            "logical {op}: left {} right {}",
            left.len(),
            right.len()
        );

        let mut result = match op {
            LogicalOp::And => {
                if truthy(&left) && truthy(&right) {
                    union(&left, &right)
                } else {
                    InstanceList::new()
                }
            }
            LogicalOp::Or => {
                if truthy(&left) || truthy(&right) {
                    union(&left, &right)
                } else {
                    InstanceList::new()
                }
            }
            LogicalOp::Xor => {
                if truthy(&left) && !truthy(&right) {
                    left
                } else if truthy(&right) && !truthy(&left) {
                    right
                } else {
                    InstanceList::new()
                }
            }
            LogicalOp::Not => {
                if truthy(&right) {
                    InstanceList::new()
                } else {
                    InstanceList::special()
                }
            }
        };
        // Tag the output like the temporal operators do, so downstream
        // nodes and reports can trace it back to this operator.
        result.set_behavior(Some(node_id));
        Ok(result)
    }
}
