// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::event::value::AttributeValue;
use crate::core::time::Time;

/// An immutable atomic observation from the event store.
///
/// Identity is the id (monotonic, globally unique within the store); value
/// equality compares the full attribute map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: u64,
    event_type: String,
    timestamp: Time,
    attrs: BTreeMap<String, AttributeValue>,
}

impl Event {
    pub fn new(
        id: u64,
        event_type: impl Into<String>,
        timestamp: Time,
        attrs: BTreeMap<String, AttributeValue>,
    ) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            timestamp,
            attrs,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> Time {
        self.timestamp
    }

    pub fn attrs(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attrs
    }

    /// Look up an attribute, synthesizing the intrinsic fields (`eventno`,
    /// `eventtype`, `timestamp`, `timestampusec`) the way store rows carry
    /// them.
    pub fn lookup(&self, name: &str) -> Option<AttributeValue> {
        match name {
            "eventno" => Some(AttributeValue::Int(self.id as i64)),
            "eventtype" => Some(AttributeValue::Str(self.event_type.clone())),
            "timestamp" => Some(AttributeValue::Int(self.timestamp.sec)),
            "timestampusec" => Some(AttributeValue::Int(i64::from(self.timestamp.usec))),
            _ => self.attrs.get(name).cloned(),
        }
    }

    /// The full attribute map including intrinsic fields. This is what gets
    /// namespaced into the correlation history when this event is consumed
    /// by a dependent state.
    pub fn full_attr_map(&self) -> BTreeMap<String, AttributeValue> {
        let mut map = self.attrs.clone();
        map.insert("eventno".to_string(), AttributeValue::Int(self.id as i64));
        map.insert(
            "eventtype".to_string(),
            AttributeValue::Str(self.event_type.clone()),
        );
        map.insert(
            "timestamp".to_string(),
            AttributeValue::Int(self.timestamp.sec),
        );
        map.insert(
            "timestampusec".to_string(),
            AttributeValue::Int(i64::from(self.timestamp.usec)),
        );
        map
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.id, self.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u64, port: i64) -> Event {
        let mut attrs = BTreeMap::new();
        attrs.insert("sport".to_string(), AttributeValue::Int(port));
        Event::new(id, "PKT_TCP", Time::new(100, 0), attrs)
    }

    #[test]
    fn intrinsic_lookups() {
        let ev = event(7, 4242);
        assert_eq!(ev.lookup("eventno"), Some(AttributeValue::Int(7)));
        assert_eq!(ev.lookup("eventtype"), Some(AttributeValue::from("PKT_TCP")));
        assert_eq!(ev.lookup("sport"), Some(AttributeValue::Int(4242)));
        assert_eq!(ev.lookup("missing"), None);
    }

    #[test]
    fn value_equality_compares_attributes() {
        assert_eq!(event(1, 80), event(1, 80));
        assert_ne!(event(1, 80), event(1, 81));
    }
}
