// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::core::event::event::Event;
use crate::core::event::instance::Instance;
use crate::core::time::Time;
use crate::core::tree::NodeId;

/// An ordered, time-sorted aggregate of instances (events or nested groups)
/// matching one behavior.
///
/// Children stay sorted by `(start, end, id)`; `start`/`end`/`count` are
/// maintained incrementally on insertion, never recomputed by scanning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventGroup {
    children: Vec<Instance>,
    start: Option<Time>,
    end: Option<Time>,
    count: usize,
    behavior: Option<NodeId>,
    dependee: Option<Box<Instance>>,
    atleast_count: Option<usize>,
}

impl EventGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: NodeId) -> Self {
        Self {
            behavior: Some(behavior),
            ..Self::default()
        }
    }

    pub fn from_children(children: impl IntoIterator<Item = Instance>) -> Self {
        let mut group = Self::new();
        for child in children {
            group.add(child);
        }
        group
    }

    /// Insert a child, preserving `(start, end, id)` order.
    pub fn add(&mut self, child: Instance) {
        let key = child.sort_key();
        let pos = self
            .children
            .partition_point(|existing| existing.sort_key() <= key);
        let (child_start, child_end) = (child.start(), child.end());
        self.children.insert(pos, child);
        self.start = Some(match self.start {
            Some(s) => s.min(child_start),
            None => child_start,
        });
        self.end = Some(match self.end {
            Some(e) => e.max(child_end),
            None => child_end,
        });
        self.count += 1;
    }

    pub fn children(&self) -> &[Instance] {
        &self.children
    }

    pub fn into_children(self) -> Vec<Instance> {
        self.children
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn start(&self) -> Option<Time> {
        self.start
    }

    pub fn end(&self) -> Option<Time> {
        self.end
    }

    /// The id of the group is the id of its last child (in sort order).
    pub fn id(&self) -> Option<u64> {
        self.children.last().map(Instance::id)
    }

    pub fn first_id(&self) -> Option<u64> {
        self.children.first().map(Instance::id)
    }

    pub fn last_id(&self) -> Option<u64> {
        self.id()
    }

    /// All underlying event ids, in child order, flattening nested groups.
    pub fn ids(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.count);
        for child in &self.children {
            out.extend(child.ids());
        }
        out
    }

    /// The last underlying event (recursing into nested groups).
    pub fn last_event(&self) -> Option<&Event> {
        self.children.last().and_then(Instance::last_event)
    }

    /// End boundary honoring a recorded at-least count: the timestamp of the
    /// child at the boundary index, falling back to the physical end.
    pub fn end_at(&self, index: usize) -> Option<Time> {
        match self.children.get(index) {
            Some(child) => Some(child.start()),
            None => self.end,
        }
    }

    pub fn logical_end(&self) -> Option<Time> {
        match self.atleast_count {
            Some(index) => self.end_at(index),
            None => self.end,
        }
    }

    pub fn behavior(&self) -> Option<NodeId> {
        self.behavior
    }

    pub fn set_behavior(&mut self, behavior: Option<NodeId>) {
        self.behavior = behavior;
    }

    pub fn dependee(&self) -> Option<&Instance> {
        self.dependee.as_deref()
    }

    pub fn set_dependee(&mut self, dependee: Option<Instance>) {
        self.dependee = dependee.map(Box::new);
    }

    pub fn atleast_count(&self) -> Option<usize> {
        self.atleast_count
    }

    pub fn set_atleast_count(&mut self, count: usize) {
        self.atleast_count = Some(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::value::AttributeValue;
    use std::collections::BTreeMap;

    fn ev(id: u64, sec: i64) -> Instance {
        Instance::Event(Event::new(
            id,
            "PKT_TCP",
            Time::new(sec, 0),
            BTreeMap::<String, AttributeValue>::new(),
        ))
    }

    #[test]
    fn insertion_preserves_time_order() {
        let mut group = EventGroup::new();
        group.add(ev(3, 30));
        group.add(ev(1, 10));
        group.add(ev(2, 20));
        let ids = group.ids();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(group.start(), Some(Time::new(10, 0)));
        assert_eq!(group.end(), Some(Time::new(30, 0)));
        assert_eq!(group.count(), 3);
    }

    #[test]
    fn group_id_is_last_child_id() {
        let mut group = EventGroup::new();
        group.add(ev(5, 50));
        group.add(ev(9, 90));
        assert_eq!(group.id(), Some(9));
        assert_eq!(group.first_id(), Some(5));
    }

    #[test]
    fn logical_end_uses_atleast_boundary() {
        let mut group = EventGroup::new();
        for i in 0..4 {
            group.add(ev(i, i as i64 * 10));
        }
        group.set_atleast_count(2);
        assert_eq!(group.logical_end(), Some(Time::new(20, 0)));
        group.set_atleast_count(99);
        assert_eq!(group.logical_end(), group.end());
    }
}
