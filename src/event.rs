use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Keys that may carry the event type tag, in lookup order.
pub const KIND_KEYS: [&str; 3] = ["event", "type", "kind"];

/// Nested object that `jfr print --json` uses for event attributes.
pub const VALUES_KEY: &str = "values";

/// One diagnostic record. The original JSON is kept verbatim; all accessors
/// are optional lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Value);

/// Classification of an event by its kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind<'a> {
    ThreadStuck(&'a str),
    GarbageCollection(&'a str),
    Other(&'a str),
    Untagged,
}

impl<'a> EventKind<'a> {
    pub fn name(&self) -> Option<&'a str> {
        match *self {
            EventKind::ThreadStuck(n) | EventKind::GarbageCollection(n) | EventKind::Other(n) => {
                Some(n)
            }
            EventKind::Untagged => None,
        }
    }
}

impl Event {
    pub fn new(value: Value) -> Self {
        Event(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Raw kind tag, if the record has one.
    pub fn kind_tag(&self) -> Option<&str> {
        let obj = self.0.as_object()?;
        KIND_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
    }

    pub fn classify<'a>(&'a self, stuck_kind: &str, gc_prefix: &str) -> EventKind<'a> {
        match self.kind_tag() {
            None => EventKind::Untagged,
            Some(k) if k == stuck_kind => EventKind::ThreadStuck(k),
            Some(k) if !gc_prefix.is_empty() && k.starts_with(gc_prefix) => {
                EventKind::GarbageCollection(k)
            }
            Some(k) => EventKind::Other(k),
        }
    }

    /// Look a field up at the top level, then under the nested `values` object.
    pub fn field(&self, key: &str) -> Option<&Value> {
        let obj = self.0.as_object()?;
        if let Some(v) = obj.get(key) {
            return Some(v);
        }
        obj.get(VALUES_KEY)
            .and_then(Value::as_object)
            .and_then(|values| values.get(key))
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    /// Stable compact JSON form of the whole record.
    pub fn to_text(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl From<Value> for Event {
    fn from(v: Value) -> Self {
        Event(v)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentFailure {
    pub segment: PathBuf,
    pub reason: String,
}

/// Ordered events produced by one load, plus how the load went.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStream {
    pub events: Vec<Event>,
    pub segments_attempted: usize,
    pub failed_segments: Vec<SegmentFailure>,
}

impl EventStream {
    pub fn from_events(events: Vec<Event>) -> Self {
        EventStream { events, ..Default::default() }
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self::from_events(values.into_iter().map(Event::from).collect())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn to_values(&self) -> Vec<Value> {
        self.events.iter().map(|e| e.as_value().clone()).collect()
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
