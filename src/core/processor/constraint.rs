// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quantitative constraint processing.
//!
//! Two families share this module. Check constraints (`icount`, `at`,
//! `end`, `duration`, `rate`, `bcount` in comparison mode) filter candidate
//! instances by a derived scalar. Apply constraints (`bcount` in partition
//! mode, `_limit`, `_eventno`) transform the children inside one instance.

use log::trace;

use crate::core::error::{EngineError, EngineResult};
use crate::core::event::{EventGroup, Instance, InstanceList};
use crate::core::tree::{Constraint, ConstraintKey, ConstraintValue, NodeId, RelOp};

/// Apply `constraint` to `instances`, dispatching between the check and
/// apply families.
pub(crate) fn process(
    constraint: &Constraint,
    instances: &InstanceList,
) -> EngineResult<InstanceList> {
    if instances.is_empty() {
        return Ok(InstanceList::new());
    }
    if instances.first().map(Instance::count).unwrap_or(0) == 0 {
        return Ok(InstanceList::new());
    }
    trace!(
        "constraint {} {} over {} instances",
        constraint.key,
        constraint.relop,
        instances.len()
    );

    if constraint.apply {
        return match constraint.key {
            ConstraintKey::Bcount => apply_bcount(constraint, instances),
            ConstraintKey::Limit => apply_limit(constraint, instances),
            ConstraintKey::EventNo => apply_eventno(constraint, instances),
            other => Err(EngineError::syntax(format!(
                "constraint '{other}' has no partition mode"
            ))),
        };
    }

    match constraint.key {
        ConstraintKey::Bcount => check_bcount(constraint, instances),
        ConstraintKey::Icount => check_icount(constraint, instances),
        ConstraintKey::At => check_scalar(constraint, instances, |i| i.start().as_secs_f64()),
        ConstraintKey::End => check_scalar(constraint, instances, |i| i.logical_end().as_secs_f64()),
        ConstraintKey::Duration => check_scalar(constraint, instances, duration_secs),
        ConstraintKey::Rate => check_scalar(constraint, instances, rate_per_sec),
        ConstraintKey::Limit => apply_limit(constraint, instances),
        ConstraintKey::EventNo => apply_eventno(constraint, instances),
    }
}

fn duration_secs(instance: &Instance) -> f64 {
    instance.logical_end().since(instance.start()).as_secs_f64()
}

fn rate_per_sec(instance: &Instance) -> f64 {
    let duration = duration_secs(instance);
    if duration > 0.0 {
        instance.count() as f64 / duration
    } else {
        0.0
    }
}

/// Relational comparison of a derived scalar; a range value means between
/// (inclusive) and is only valid with `=`.
fn compare(relop: RelOp, value: &ConstraintValue, actual: f64) -> EngineResult<bool> {
    match value {
        ConstraintValue::Range(lower, upper) => {
            if relop != RelOp::Eq {
                return Err(EngineError::syntax(format!(
                    "a range constraint cannot be related via '{relop}'"
                )));
            }
            Ok(actual >= *lower as f64 && actual <= *upper as f64)
        }
        other => Ok(relop.holds(actual, other.as_f64()?)),
    }
}

/// Fresh group from a candidate's children, carrying its backpointers.
fn rewrap(instance: &Instance) -> EventGroup {
    let mut group = match instance {
        Instance::Group(g) => {
            let mut fresh = EventGroup::from_children(g.children().iter().cloned());
            fresh.set_dependee(g.dependee().cloned());
            fresh
        }
        Instance::Event(ev) => EventGroup::from_children([Instance::Event(ev.clone())]),
    };
    group.set_behavior(instance.behavior());
    group
}

/// `icount` checks the total underlying event count of the whole list,
/// passing or rejecting it wholesale.
fn check_icount(constraint: &Constraint, instances: &InstanceList) -> EngineResult<InstanceList> {
    let total = instances.ids().len() as f64;
    if compare(constraint.relop, &constraint.value, total)? {
        Ok(instances.clone())
    } else {
        Ok(InstanceList::new())
    }
}

fn check_scalar(
    constraint: &Constraint,
    instances: &InstanceList,
    derive: impl Fn(&Instance) -> f64,
) -> EngineResult<InstanceList> {
    let mut out = InstanceList::new();
    out.set_behavior(instances.behavior());
    for candidate in instances {
        if compare(constraint.relop, &constraint.value, derive(candidate))? {
            out.insert(Instance::Group(rewrap(candidate)));
        }
    }
    Ok(out)
}

/// `bcount` in comparison mode: per-candidate child count. A `>=` match
/// records the bound as the candidate's at-least count so duration and rate
/// computations later use the logical rather than physical end.
fn check_bcount(constraint: &Constraint, instances: &InstanceList) -> EngineResult<InstanceList> {
    let mut out = InstanceList::new();
    out.set_behavior(instances.behavior());
    for candidate in instances {
        if compare(constraint.relop, &constraint.value, candidate.count() as f64)? {
            let mut group = rewrap(candidate);
            if constraint.relop == RelOp::Ge {
                group.set_atleast_count(usize::try_from(constraint.value.as_i64()?).unwrap_or(0));
            }
            out.insert(Instance::Group(group));
        }
    }
    Ok(out)
}

fn non_negative(value: &ConstraintValue, key: ConstraintKey) -> EngineResult<usize> {
    let v = value.as_i64()?;
    if v < 0 {
        return Err(EngineError::constraint(format!(
            "'{key}' followed by a negative value {v}"
        )));
    }
    Ok(v as usize)
}

/// `_limit = N`: the first N children of the first instance, returned as
/// individual instances.
fn apply_limit(constraint: &Constraint, instances: &InstanceList) -> EngineResult<InstanceList> {
    if constraint.relop != RelOp::Eq {
        return Err(EngineError::syntax("'_limit' can be followed only by '='"));
    }
    let limit = non_negative(&constraint.value, ConstraintKey::Limit)?;
    let mut out = InstanceList::new();
    if let Some(instance) = instances.first() {
        for child in children_of(instance).into_iter().take(limit) {
            out.insert(child);
        }
    }
    Ok(out)
}

/// `_eventno`: keep children of the first instance whose id falls in the
/// window derived from the relation, defaulting open bounds to the
/// instance's own id range.
fn apply_eventno(constraint: &Constraint, instances: &InstanceList) -> EngineResult<InstanceList> {
    let (mut lower, mut upper): (Option<u64>, Option<u64>) = match &constraint.value {
        ConstraintValue::Range(l, u) => {
            if constraint.relop != RelOp::Eq {
                return Err(EngineError::syntax(format!(
                    "'_eventno' cannot be related to a range via '{}'",
                    constraint.relop
                )));
            }
            (Some(*l as u64), Some(*u as u64))
        }
        value => {
            let v = non_negative(value, ConstraintKey::EventNo)? as u64;
            match constraint.relop {
                RelOp::Eq => (Some(v), Some(v)),
                RelOp::Gt => (Some(v + 1), None),
                RelOp::Ge => (Some(v), None),
                RelOp::Le => (None, Some(v)),
                RelOp::Lt => (None, Some(v.saturating_sub(1).max(1))),
                RelOp::Ne => {
                    return Err(EngineError::syntax(
                        "unsupported operator '!=' for '_eventno'",
                    ))
                }
            }
        }
    };

    let mut out = InstanceList::new();
    if let Some(instance) = instances.first() {
        let lower = *lower.get_or_insert(0);
        let upper = *upper.get_or_insert(instance.id());
        for child in children_of(instance) {
            let id = child.id();
            if id >= lower && id <= upper {
                out.insert(child);
            }
        }
    }
    Ok(out)
}

fn children_of(instance: &Instance) -> Vec<Instance> {
    match instance {
        Instance::Group(g) => g.children().to_vec(),
        Instance::Event(ev) => vec![Instance::Event(ev.clone())],
    }
}

/// `bcount` in partition mode: regroup the children of a single instance.
/// A multi-instance input is first merged into one group.
fn apply_bcount(constraint: &Constraint, instances: &InstanceList) -> EngineResult<InstanceList> {
    let base: EventGroup = if instances.len() > 1 {
        let mut group = EventGroup::new();
        for instance in instances {
            group.add(instance.clone());
        }
        group.set_behavior(instances.iter().last().and_then(Instance::behavior));
        group
    } else {
        match instances.first() {
            Some(Instance::Group(g)) => g.clone(),
            Some(Instance::Event(ev)) => {
                EventGroup::from_children([Instance::Event(ev.clone())])
            }
            None => EventGroup::new(),
        }
    };

    let children = base.children().to_vec();
    let count = children.len();
    let behavior = base.behavior();
    let dependee = base.dependee().cloned();
    let mut out = InstanceList::new();
    out.set_behavior(instances.behavior());

    match &constraint.value {
        ConstraintValue::Range(lower, upper) => {
            if constraint.relop != RelOp::Eq {
                return Err(EngineError::syntax(format!(
                    "'bcount' cannot be related to a range via '{}'",
                    constraint.relop
                )));
            }
            let lower = usize::try_from(*lower)
                .map_err(|_| EngineError::constraint("negative 'bcount' range bound"))?;
            let upper = usize::try_from(*upper)
                .map_err(|_| EngineError::constraint("negative 'bcount' range bound"))?;
            if count <= lower {
                return Ok(out);
            }
            // Greedy fill: full groups of `upper`, the final group shrinks
            // to the remainder when it still reaches `lower`, anything
            // smaller is dropped.
            let mut index = 0;
            while count - index > lower {
                let take = (count - index).min(upper);
                if take < lower {
                    break;
                }
                let mut group = fresh_group(behavior, &dependee);
                for child in &children[index..index + take] {
                    group.add(child.clone());
                }
                out.insert(Instance::Group(group));
                index += take;
            }
        }
        value => {
            let bound = non_negative(value, ConstraintKey::Bcount)?;
            match constraint.relop {
                RelOp::Eq => {
                    if count >= bound {
                        partition(&children, bound, true, behavior, &dependee, &mut out);
                    }
                }
                RelOp::Gt | RelOp::Ge => {
                    let accepted = if constraint.relop == RelOp::Gt {
                        count > bound
                    } else {
                        count >= bound
                    };
                    if accepted {
                        let mut group = fresh_group(behavior, &dependee);
                        for child in &children {
                            group.add(child.clone());
                        }
                        if constraint.relop == RelOp::Ge {
                            group.set_atleast_count(bound);
                        }
                        out.insert(Instance::Group(group));
                    }
                }
                RelOp::Le => {
                    if count <= bound {
                        let mut group = fresh_group(behavior, &dependee);
                        for child in &children {
                            group.add(child.clone());
                        }
                        out.insert(Instance::Group(group));
                    } else {
                        partition(&children, bound, false, behavior, &dependee, &mut out);
                    }
                }
                RelOp::Lt => {
                    if count < bound {
                        let mut group = fresh_group(behavior, &dependee);
                        for child in &children {
                            group.add(child.clone());
                        }
                        out.insert(Instance::Group(group));
                    } else if count > bound {
                        partition(&children, bound - 1, false, behavior, &dependee, &mut out);
                    }
                }
                RelOp::Ne => {
                    return Err(EngineError::syntax(
                        "unsupported operator '!=' for 'bcount'",
                    ))
                }
            }
        }
    }
    Ok(out)
}

fn fresh_group(behavior: Option<NodeId>, dependee: &Option<Instance>) -> EventGroup {
    let mut group = EventGroup::new();
    group.set_behavior(behavior);
    group.set_dependee(dependee.clone());
    group
}

/// Consecutive chunks of `size`. With `exact` the trailing partial chunk is
/// dropped, otherwise it is kept as the remainder.
fn partition(
    children: &[Instance],
    size: usize,
    exact: bool,
    behavior: Option<NodeId>,
    dependee: &Option<Instance>,
    out: &mut InstanceList,
) {
    if size == 0 {
        return;
    }
    for chunk in children.chunks(size) {
        if exact && chunk.len() < size {
            break;
        }
        let mut group = fresh_group(behavior, dependee);
        for child in chunk {
            group.add(child.clone());
        }
        out.insert(Instance::Group(group));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::Event;
    use crate::core::time::Time;
    use std::collections::BTreeMap;

    fn ev(id: u64, sec: i64) -> Instance {
        Instance::Event(Event::new(id, "PKT_TCP", Time::new(sec, 0), BTreeMap::new()))
    }

    fn group_of(n: usize) -> InstanceList {
        let mut group = EventGroup::new();
        for i in 0..n {
            group.add(ev(i as u64 + 1, i as i64));
        }
        let mut list = InstanceList::new();
        list.insert(Instance::Group(group));
        list
    }

    fn bcount(relop: RelOp, value: ConstraintValue) -> Constraint {
        Constraint::new(ConstraintKey::Bcount, relop, value).applied()
    }

    #[test]
    fn bcount_range_partitions_greedily() {
        let c = bcount(RelOp::Eq, ConstraintValue::Range(5, 10));
        let out = process(&c, &group_of(23)).unwrap();
        let sizes: Vec<usize> = out.iter().map(Instance::count).collect();
        assert_eq!(sizes, vec![10, 10]);
    }

    #[test]
    fn bcount_exact_drops_incomplete_trailing_group() {
        let c = bcount(RelOp::Eq, ConstraintValue::Int(10));
        let out = process(&c, &group_of(20)).unwrap();
        let sizes: Vec<usize> = out.iter().map(Instance::count).collect();
        assert_eq!(sizes, vec![10, 10]);

        let out = process(&c, &group_of(25)).unwrap();
        let sizes: Vec<usize> = out.iter().map(Instance::count).collect();
        assert_eq!(sizes, vec![10, 10]);
    }

    #[test]
    fn bcount_le_keeps_the_remainder() {
        let c = bcount(RelOp::Le, ConstraintValue::Int(10));
        let out = process(&c, &group_of(23)).unwrap();
        let sizes: Vec<usize> = out.iter().map(Instance::count).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
    }

    #[test]
    fn bcount_lt_uses_one_less_than_the_bound() {
        let c = bcount(RelOp::Lt, ConstraintValue::Int(10));
        let out = process(&c, &group_of(20)).unwrap();
        let sizes: Vec<usize> = out.iter().map(Instance::count).collect();
        assert_eq!(sizes, vec![9, 9, 2]);
    }

    #[test]
    fn bcount_ge_accepts_whole_and_records_atleast() {
        let c = bcount(RelOp::Ge, ConstraintValue::Int(5));
        let out = process(&c, &group_of(8)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.first().unwrap().atleast_count(), Some(5));
    }

    #[test]
    fn check_bcount_filters_candidates() {
        let mut list = InstanceList::new();
        let mut small = EventGroup::new();
        small.add(ev(1, 1));
        let mut large = EventGroup::new();
        for i in 0..4 {
            large.add(ev(10 + i, 10 + i as i64));
        }
        list.insert(Instance::Group(small));
        list.insert(Instance::Group(large));

        let c = Constraint::new(ConstraintKey::Bcount, RelOp::Gt, ConstraintValue::Int(2));
        let out = process(&c, &list).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.first().unwrap().count(), 4);
    }

    #[test]
    fn icount_passes_or_rejects_the_whole_list() {
        let list = group_of(7);
        let pass = Constraint::new(ConstraintKey::Icount, RelOp::Ge, ConstraintValue::Int(5));
        assert_eq!(process(&pass, &list).unwrap().len(), 1);
        let fail = Constraint::new(ConstraintKey::Icount, RelOp::Gt, ConstraintValue::Int(7));
        assert!(process(&fail, &list).unwrap().is_empty());
    }

    #[test]
    fn limit_keeps_the_first_n_children() {
        let c = Constraint::new(ConstraintKey::Limit, RelOp::Eq, ConstraintValue::Int(3));
        let out = process(&c, &group_of(10)).unwrap();
        assert_eq!(out.ids(), vec![1, 2, 3]);
    }

    #[test]
    fn eventno_windows_by_id() {
        let c = Constraint::new(ConstraintKey::EventNo, RelOp::Le, ConstraintValue::Int(4));
        let out = process(&c, &group_of(10)).unwrap();
        assert_eq!(out.ids(), vec![1, 2, 3, 4]);

        let c = Constraint::new(ConstraintKey::EventNo, RelOp::Gt, ConstraintValue::Int(7));
        let out = process(&c, &group_of(10)).unwrap();
        assert_eq!(out.ids(), vec![8, 9, 10]);

        let c = Constraint::new(
            ConstraintKey::EventNo,
            RelOp::Eq,
            ConstraintValue::Range(3, 5),
        );
        let out = process(&c, &group_of(10)).unwrap();
        assert_eq!(out.ids(), vec![3, 4, 5]);
    }

    #[test]
    fn duration_check_uses_time_bounds() {
        // 10 events, one second apart: duration 9s.
        let list = group_of(10);
        let c = Constraint::new(ConstraintKey::Duration, RelOp::Le, ConstraintValue::Int(9));
        assert_eq!(process(&c, &list).unwrap().len(), 1);
        let c = Constraint::new(ConstraintKey::Duration, RelOp::Lt, ConstraintValue::Int(9));
        assert!(process(&c, &list).unwrap().is_empty());
    }

    #[test]
    fn range_values_require_equality() {
        let c = Constraint::new(
            ConstraintKey::Duration,
            RelOp::Ge,
            ConstraintValue::Range(1, 5),
        );
        assert!(process(&c, &group_of(3)).is_err());
    }
}
