use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use agentmesh_domain::{EventRecord, Result};

use crate::topic::{retry_topic_name, DEAD_LETTER_TOPIC};
use crate::Bus;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, record: EventRecord) -> Result<()>;
}

/// Consumes one topic on behalf of `group_id`, processing each partition
/// sequentially. An offset is committed only after the handler returns,
/// and once committed it is never re-read — retries are driven by
/// republishing to `<topic>-retry` with an incremented retry-count
/// header, not by rewinding the offset.
pub struct ConsumerGroup {
    bus: Arc<Bus>,
    group_id: String,
    topic: String,
    max_retries: u32,
    offsets: DashMap<u32, AtomicU64>,
}

impl ConsumerGroup {
    pub fn new(bus: Arc<Bus>, group_id: impl Into<String>, topic: impl Into<String>, max_retries: u32) -> Self {
        Self {
            bus,
            group_id: group_id.into(),
            topic: topic.into(),
            max_retries,
            offsets: DashMap::new(),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    fn committed_offset(&self, partition: u32) -> u64 {
        self.offsets
            .entry(partition)
            .or_insert_with(|| AtomicU64::new(0))
            .load(Ordering::SeqCst)
    }

    /// Process every record currently buffered across all partitions,
    /// sequentially within each partition. Returns the number of records
    /// handled (including ones that ended up retried/dead-lettered).
    pub async fn process_available(&self, handler: &dyn Handler) -> Result<usize> {
        let partition_count = self.bus.partition_count(&self.topic);
        let mut processed = 0usize;
        for partition in 0..partition_count {
            loop {
                let offset = self.committed_offset(partition);
                let Some(record) = self.bus.read(&self.topic, partition, offset) else {
                    break;
                };
                self.handle_one(handler, partition, offset, record).await?;
                processed += 1;
            }
        }
        Ok(processed)
    }

    async fn handle_one(
        &self,
        handler: &dyn Handler,
        partition: u32,
        offset: u64,
        mut record: EventRecord,
    ) -> Result<()> {
        let result = handler.handle(record.clone()).await;
        if let Err(e) = result {
            let retry_count: u32 = record
                .event
                .metadata
                .get("retry-count")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            tracing::warn!(
                topic = %self.topic,
                group = %self.group_id,
                partition,
                offset,
                retry_count,
                error = %e,
                "handler failed"
            );
            record
                .event
                .metadata
                .insert("retry-count".into(), (retry_count + 1).to_string());
            if retry_count + 1 >= self.max_retries {
                self.bus.publish(DEAD_LETTER_TOPIC, record).await?;
            } else {
                let retry_topic = retry_topic_name(&self.topic);
                self.bus.publish(&retry_topic, record).await?;
            }
        }
        // Offset always advances: re-reading the same record is never correct.
        self.offsets
            .entry(partition)
            .or_insert_with(|| AtomicU64::new(0))
            .store(offset + 1, Ordering::SeqCst);
        Ok(())
    }

    /// Poll `process_available` on an interval until the returned future
    /// is dropped/aborted. Intended to be wrapped in `tokio::spawn`.
    pub async fn run_forever(self: Arc<Self>, handler: Arc<dyn Handler>, poll_interval: Duration) {
        loop {
            if let Err(e) = self.process_available(handler.as_ref()).await {
                tracing::error!(error = %e, "consumer group poll failed");
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_domain::{Error, Event};
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;

    struct CountingHandler {
        calls: AtomicUsize,
        fail_first_n: usize,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn handle(&self, _record: EventRecord) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(Error::HandlerFailed("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    fn rec() -> EventRecord {
        EventRecord::new(Event::new("t", "s", Value::Null), "k")
    }

    #[tokio::test]
    async fn offset_commits_after_success_and_never_reprocesses() {
        let bus = Arc::new(Bus::new(1));
        bus.publish("runs", rec()).await.unwrap();
        let group = ConsumerGroup::new(bus, "workers", "runs", 3);
        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
            fail_first_n: 0,
        };
        let processed = group.process_available(&handler).await.unwrap();
        assert_eq!(processed, 1);
        let processed_again = group.process_available(&handler).await.unwrap();
        assert_eq!(processed_again, 0, "already-committed offset must not be reprocessed");
    }

    #[tokio::test]
    async fn failure_routes_to_retry_topic_and_still_advances_offset() {
        let bus = Arc::new(Bus::new(1));
        bus.publish("runs", rec()).await.unwrap();
        let group = ConsumerGroup::new(bus.clone(), "workers", "runs", 5);
        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
            fail_first_n: 1,
        };
        group.process_available(&handler).await.unwrap();
        assert_eq!(bus.len("runs-retry", 0), 1);
        assert_eq!(group.committed_offset(0), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter() {
        let bus = Arc::new(Bus::new(1));
        bus.publish("runs", rec()).await.unwrap();
        let group = ConsumerGroup::new(bus.clone(), "workers", "runs", 1);
        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
            fail_first_n: 1,
        };
        group.process_available(&handler).await.unwrap();
        assert_eq!(bus.len(crate::DEAD_LETTER_TOPIC, 0), 1);
    }
}
