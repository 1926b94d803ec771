use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use agentmesh_domain::{EventRecord, Result};

use crate::Bus;

/// Idempotent producer: `maxInFlightRequests = 1` — publishes from one
/// producer are serialized, and every record is stamped with the
/// producer id and a monotonic per-producer sequence number so a
/// downstream consumer can detect and drop a duplicate redelivery.
pub struct Producer {
    bus: Arc<Bus>,
    producer_id: String,
    sequence: AtomicU64,
    inflight: Mutex<()>,
}

impl Producer {
    pub fn new(bus: Arc<Bus>, client_id: impl Into<String>) -> Self {
        Self {
            bus,
            producer_id: format!("{}-producer", client_id.into()),
            sequence: AtomicU64::new(0),
            inflight: Mutex::new(()),
        }
    }

    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    pub async fn publish(&self, topic: &str, mut record: EventRecord) -> Result<(u32, u64)> {
        let _guard = self.inflight.lock().await;
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        record
            .event
            .metadata
            .insert("producer-id".into(), self.producer_id.clone());
        record
            .event
            .metadata
            .insert("producer-sequence".into(), seq.to_string());
        self.bus.publish(topic, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_domain::Event;
    use serde_json::Value;

    #[tokio::test]
    async fn publishes_carry_monotonic_producer_sequence() {
        let bus = Arc::new(Bus::new(1));
        let producer = Producer::new(bus, "scheduler");
        let r1 = EventRecord::new(Event::new("t", "s", Value::Null), "k");
        let r2 = EventRecord::new(Event::new("t", "s", Value::Null), "k");
        producer.publish("events", r1).await.unwrap();
        producer.publish("events", r2).await.unwrap();
        assert_eq!(producer.producer_id(), "scheduler-producer");
    }
}
