// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::error::{EngineError, EngineResult};
use crate::core::event::{AttributeValue, Event, EventGroup};
use crate::core::store::{EventStore, PredOp, Predicate};
use crate::core::time::Time;

/// Compiled glob patterns, shared across stores. Patterns come from parsed
/// scripts, so the population is small and never evicted.
static GLOB_CACHE: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn glob_matches(pattern: &str, value: &str) -> EngineResult<bool> {
    if pattern == "*" {
        return Ok(true);
    }
    let mut cache = GLOB_CACHE
        .lock()
        .map_err(|_| EngineError::store("glob cache poisoned"))?;
    if !cache.contains_key(pattern) {
        let mut regex_text = String::with_capacity(pattern.len() + 2);
        regex_text.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => regex_text.push_str(".*"),
                '?' => regex_text.push('.'),
                other => regex_text.push_str(&regex::escape(&other.to_string())),
            }
        }
        regex_text.push('$');
        let compiled = Regex::new(&regex_text)
            .map_err(|e| EngineError::store(format!("invalid glob pattern '{pattern}': {e}")))?;
        cache.insert(pattern.to_string(), compiled);
    }
    Ok(cache[pattern].is_match(value))
}

/// In-memory event store: a time-ordered event log with linear predicate
/// scans, restricted up front by the id set when one is given.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: BTreeMap<u64, Event>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event: Event) {
        self.events.insert(event.id(), event);
    }

    /// Convenience loader for fixtures: `(id, type, seconds, attrs)` rows.
    pub fn with_events(events: impl IntoIterator<Item = Event>) -> Self {
        let mut store = Self::new();
        for event in events {
            store.insert(event);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn event_matches(event: &Event, predicate: &Predicate) -> EngineResult<bool> {
        for term in &predicate.terms {
            let value = event
                .lookup(&term.attr)
                .map(|v| v.render())
                .unwrap_or_default();
            let ok = match term.op {
                PredOp::Eq => value == term.value,
                PredOp::Ne => value != term.value,
                PredOp::Glob => glob_matches(&term.value, &value)?,
                PredOp::NotGlob => !glob_matches(&term.value, &value)?,
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl EventStore for MemoryEventStore {
    fn matching_instances(
        &self,
        predicate: &Predicate,
        restrict_ids: Option<&[u64]>,
    ) -> EngineResult<EventGroup> {
        let mut group = EventGroup::new();
        match restrict_ids {
            Some(ids) => {
                let ids: BTreeSet<u64> = ids.iter().copied().collect();
                for id in ids {
                    if let Some(event) = self.events.get(&id) {
                        if Self::event_matches(event, predicate)? {
                            group.add(event.clone().into());
                        }
                    }
                }
            }
            None => {
                for event in self.events.values() {
                    if Self::event_matches(event, predicate)? {
                        group.add(event.clone().into());
                    }
                }
            }
        }
        Ok(group)
    }

    fn event(&self, id: u64) -> EngineResult<Option<Event>> {
        Ok(self.events.get(&id).cloned())
    }

    fn attribute_names(&self, event_type: &str) -> Vec<String> {
        let mut names: BTreeSet<String> = BTreeSet::new();
        for event in self.events.values() {
            if event.event_type() == event_type {
                names.extend(event.attrs().keys().cloned());
            }
        }
        names.into_iter().collect()
    }

    fn event_types(&self) -> Vec<String> {
        let mut types: BTreeSet<String> = BTreeSet::new();
        for event in self.events.values() {
            types.insert(event.event_type().to_string());
        }
        types.into_iter().collect()
    }
}

/// Fixture helper used throughout the test suites.
pub fn fixture_event(
    id: u64,
    event_type: &str,
    time: Time,
    attrs: &[(&str, AttributeValue)],
) -> Event {
    let map: BTreeMap<String, AttributeValue> = attrs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Event::new(id, event_type, time, map)
}
