// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::core::event::event::Event;
use crate::core::event::group::EventGroup;
use crate::core::time::Time;
use crate::core::tree::NodeId;

/// A single match produced by an evaluator node: either a bare event or a
/// group aggregating several of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instance {
    Event(Event),
    Group(EventGroup),
}

impl Instance {
    pub fn id(&self) -> u64 {
        match self {
            Instance::Event(ev) => ev.id(),
            Instance::Group(g) => g.id().unwrap_or(0),
        }
    }

    pub fn start(&self) -> Time {
        match self {
            Instance::Event(ev) => ev.timestamp(),
            Instance::Group(g) => g.start().unwrap_or(Time::ZERO),
        }
    }

    pub fn end(&self) -> Time {
        match self {
            Instance::Event(ev) => ev.timestamp(),
            Instance::Group(g) => g.end().unwrap_or(Time::ZERO),
        }
    }

    /// End boundary honoring the group's at-least count, where present.
    pub fn logical_end(&self) -> Time {
        match self {
            Instance::Event(ev) => ev.timestamp(),
            Instance::Group(g) => g.logical_end().or(g.end()).unwrap_or(Time::ZERO),
        }
    }

    pub fn sort_key(&self) -> (Time, Time, u64) {
        (self.start(), self.end(), self.id())
    }

    /// All underlying event ids, flattening nested groups.
    pub fn ids(&self) -> Vec<u64> {
        match self {
            Instance::Event(ev) => vec![ev.id()],
            Instance::Group(g) => g.ids(),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Instance::Event(_) => 1,
            Instance::Group(g) => g.count(),
        }
    }

    pub fn last_event(&self) -> Option<&Event> {
        match self {
            Instance::Event(ev) => Some(ev),
            Instance::Group(g) => g.last_event(),
        }
    }

    pub fn as_group(&self) -> Option<&EventGroup> {
        match self {
            Instance::Group(g) => Some(g),
            Instance::Event(_) => None,
        }
    }

    pub fn behavior(&self) -> Option<NodeId> {
        match self {
            Instance::Event(_) => None,
            Instance::Group(g) => g.behavior(),
        }
    }

    pub fn dependee(&self) -> Option<&Instance> {
        match self {
            Instance::Event(_) => None,
            Instance::Group(g) => g.dependee(),
        }
    }

    /// Dependee markers only live on groups; setting one on a bare event is
    /// a no-op.
    pub fn set_dependee(&mut self, dependee: Option<Instance>) {
        if let Instance::Group(g) = self {
            g.set_dependee(dependee);
        }
    }

    pub fn atleast_count(&self) -> Option<usize> {
        match self {
            Instance::Event(_) => None,
            Instance::Group(g) => g.atleast_count(),
        }
    }

    /// Whether both instances cover exactly the same underlying events.
    pub fn same_events(&self, other: &Instance) -> bool {
        self.ids() == other.ids()
    }
}

impl From<Event> for Instance {
    fn from(ev: Event) -> Self {
        Instance::Event(ev)
    }
}

impl From<EventGroup> for Instance {
    fn from(g: EventGroup) -> Self {
        Instance::Group(g)
    }
}

/// A time-sorted list of instances, the unit of data every evaluator node
/// consumes and produces.
///
/// `special` marks the distinguished non-empty-but-eventless result a
/// negation emits when its operand matched nothing; logical operators treat
/// it as truth, everything downstream treats it as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceList {
    items: Vec<Instance>,
    behavior: Option<NodeId>,
    special: bool,
}

impl InstanceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: NodeId) -> Self {
        Self {
            behavior: Some(behavior),
            ..Self::default()
        }
    }

    /// The negation marker list: counts as a match but carries no events.
    pub fn special() -> Self {
        Self {
            special: true,
            ..Self::default()
        }
    }

    pub fn is_special(&self) -> bool {
        self.special
    }

    /// Insert, preserving `(start, end, id)` order.
    pub fn insert(&mut self, instance: Instance) {
        let key = instance.sort_key();
        let pos = self
            .items
            .partition_point(|existing| existing.sort_key() <= key);
        self.items.insert(pos, instance);
    }

    /// Merge another list in, keeping order.
    pub fn merge(&mut self, other: InstanceList) {
        if other.special {
            self.special = true;
        }
        for item in other.items {
            self.insert(item);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Instance] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Instance> {
        self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&Instance> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&Instance> {
        self.items.get(index)
    }

    /// All underlying event ids across every instance, flattened.
    pub fn ids(&self) -> Vec<u64> {
        let mut out = Vec::new();
        for item in &self.items {
            out.extend(item.ids());
        }
        out
    }

    /// One id per instance (the instance's own id, not its constituents).
    pub fn instance_ids(&self) -> Vec<u64> {
        self.items.iter().map(Instance::id).collect()
    }

    pub fn behavior(&self) -> Option<NodeId> {
        self.behavior
    }

    pub fn set_behavior(&mut self, behavior: Option<NodeId>) {
        self.behavior = behavior;
    }
}

impl FromIterator<Instance> for InstanceList {
    fn from_iter<I: IntoIterator<Item = Instance>>(iter: I) -> Self {
        let mut list = InstanceList::new();
        for item in iter {
            list.insert(item);
        }
        list
    }
}

impl IntoIterator for InstanceList {
    type Item = Instance;
    type IntoIter = std::vec::IntoIter<Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a InstanceList {
    type Item = &'a Instance;
    type IntoIter = std::slice::Iter<'a, Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
