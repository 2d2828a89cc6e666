//! Domain events emitted by the observed state machine.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Key/value attribute of an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// A typed event with ordered attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(EventAttribute {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// First value for `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// Append-only event sink. Clones share the same sink.
#[derive(Debug, Clone, Default)]
pub struct EventManager {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_event(&self, event: Event) {
        self.events.lock().push(event);
    }

    pub fn emit_events(&self, events: impl IntoIterator<Item = Event>) {
        self.events.lock().extend(events);
    }

    /// Snapshot of all events emitted so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// True when both managers write to the same sink.
    pub fn same_sink(&self, other: &EventManager) -> bool {
        Arc::ptr_eq(&self.events, &other.events)
    }
}
