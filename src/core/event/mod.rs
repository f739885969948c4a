// SPDX-License-Identifier: MIT OR Apache-2.0

//! The matched-data currency passed between evaluator components: scalar
//! attribute values, events, sorted event groups, and the instance
//! abstraction both satisfy.

pub mod event;
pub mod group;
pub mod instance;
pub mod value;

pub use event::Event;
pub use group::EventGroup;
pub use instance::{Instance, InstanceList};
pub use value::AttributeValue;
