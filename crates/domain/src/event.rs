use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single fact published onto the mesh.
///
/// `id` is a UUIDv7 — timestamp-ordered, so lexicographic order on `id`
/// matches creation order even across publishers. `sequence` is assigned
/// by the durable state store at append time and is the authoritative
/// total order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    #[serde(default)]
    pub target: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Assigned by the store on append; absent on events not yet persisted.
    #[serde(default)]
    pub sequence: Option<u64>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            source: source.into(),
            target: None,
            timestamp: Utc::now(),
            data,
            metadata: HashMap::new(),
            sequence: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// An [`Event`] as it is carried on the bus: adds the partition routing key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    #[serde(flatten)]
    pub event: Event,
    pub partition_key: String,
}

impl EventRecord {
    pub fn new(event: Event, partition_key: impl Into<String>) -> Self {
        Self {
            event,
            partition_key: partition_key.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_has_no_sequence() {
        let e = Event::new("agent.heartbeat", "scheduler", Value::Null);
        assert!(e.sequence.is_none());
    }

    #[test]
    fn uuidv7_ids_are_monotonic_with_creation_order() {
        let a = Event::new("a", "s", Value::Null);
        let b = Event::new("b", "s", Value::Null);
        assert!(a.id <= b.id, "UUIDv7 ids should be non-decreasing in creation order");
    }

    #[test]
    fn event_record_flattens_event_fields() {
        let e = Event::new("agent.heartbeat", "scheduler", Value::Null);
        let rec = EventRecord::new(e.clone(), "agent-42");
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "agent.heartbeat");
        assert_eq!(json["partition_key"], "agent-42");
    }
}
