//! Unified mesh facade.
//!
//! Single entry point that fans each published event to the durable
//! store (assigns `sequence`), the streaming bus (delivery to consumer
//! groups), and in-process handlers registered via `subscribe`, then
//! appends it to a bounded ring used as a query fallback. Every external
//! client is optional: with store and bus both absent, `publish` and
//! `subscribe` degrade to ring-plus-local-dispatch and remain total.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use agentmesh_bus::{Bus, ConsumerGroup, Producer};
use agentmesh_domain::{Event, EventRecord, Result};
use agentmesh_store::Store;

const RING_CAPACITY: usize = 1_000;
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_BUS_MAX_RETRIES: u32 = 5;

/// An in-process subscriber of a single event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<()>;
}

#[derive(Default, Clone)]
pub struct SubscribeOptions {
    /// Consumer group id for the bus-backed subscription.
    /// Defaults to `"<source>-group"`.
    pub group_id: Option<String>,
}

/// Conjunction of optional filters for [`MeshFacade::query_history`].
#[derive(Default, Clone)]
pub struct HistoryFilter {
    pub event_type: Option<String>,
    pub types: Option<Vec<String>>,
    pub source: Option<String>,
    pub target: Option<String>,
}

impl HistoryFilter {
    fn matches(&self, event: &Event) -> bool {
        if let Some(t) = &self.event_type {
            if &event.event_type != t {
                return false;
            }
        }
        if let Some(types) = &self.types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if &event.source != source {
                return false;
            }
        }
        if let Some(target) = &self.target {
            if event.target.as_deref() != Some(target.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Adapts a local [`EventHandler`] to a bus [`agentmesh_bus::Handler`] so
/// the same subscription can be driven by a consumer group.
struct HandlerAdapter(Arc<dyn EventHandler>);

#[async_trait]
impl agentmesh_bus::Handler for HandlerAdapter {
    async fn handle(&self, record: EventRecord) -> Result<()> {
        self.0.handle(&record.event).await
    }
}

pub struct MeshFacade {
    source: String,
    store: Option<Arc<dyn Store>>,
    bus: Option<Arc<Bus>>,
    producer: Option<Producer>,
    bus_max_retries: u32,
    handlers: DashMap<String, Vec<Arc<dyn EventHandler>>>,
    ring: Mutex<VecDeque<Event>>,
    watch_tx: broadcast::Sender<Event>,
}

impl MeshFacade {
    pub fn new(source: impl Into<String>, store: Option<Arc<dyn Store>>, bus: Option<Arc<Bus>>) -> Self {
        let source = source.into();
        let producer = bus.as_ref().map(|bus| Producer::new(bus.clone(), source.clone()));
        let (watch_tx, _rx) = broadcast::channel(RING_CAPACITY);
        Self {
            source,
            store,
            bus,
            producer,
            bus_max_retries: DEFAULT_BUS_MAX_RETRIES,
            handlers: DashMap::new(),
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            watch_tx,
        }
    }

    /// Construct an [`Event`], assign it a sequence via the store (if
    /// configured), publish to the bus, dispatch to local handlers, and
    /// append to the ring. Total regardless of which external clients
    /// are present.
    pub async fn publish(&self, event_type: &str, data: Value, metadata: Option<HashMap<String, String>>) -> Result<Event> {
        let mut event = Event::new(event_type, self.source.clone(), data);
        if let Some(metadata) = metadata {
            event.metadata.extend(metadata);
        }

        if let Some(store) = &self.store {
            event = store.append_event(event).await?;
        }

        if let Some(producer) = &self.producer {
            let topic = format!("agent-events-{event_type}");
            let record = EventRecord::new(event.clone(), self.source.clone());
            if let Err(e) = producer.publish(&topic, record).await {
                tracing::warn!(event_type, error = %e, "failed to publish event to bus");
            }
        }

        self.dispatch_handlers(&event).await;
        self.push_ring(event.clone());
        let _ = self.watch_tx.send(event.clone());

        Ok(event)
    }

    async fn dispatch_handlers(&self, event: &Event) {
        let Some(handlers) = self.handlers.get(&event.event_type) else {
            return;
        };
        for handler in handlers.value().iter() {
            if let Err(e) = handler.handle(event).await {
                tracing::error!(event_type = %event.event_type, error = %e, "event handler failed");
            }
        }
    }

    fn push_ring(&self, event: Event) {
        let mut ring = self.ring.lock();
        if ring.len() >= RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(event);
    }

    /// Register a local handler for `event_type`. If a bus is
    /// configured, also starts a background consumer group on
    /// `"agent-events-" + event_type` so at-least-once bus delivery
    /// reaches the same handler.
    pub fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>, opts: Option<SubscribeOptions>) {
        self.handlers
            .entry(event_type.to_string())
            .or_default()
            .push(handler.clone());

        if let Some(bus) = &self.bus {
            let group_id = opts
                .and_then(|o| o.group_id)
                .unwrap_or_else(|| format!("{}-group", self.source));
            let topic = format!("agent-events-{event_type}");
            let group = Arc::new(ConsumerGroup::new(bus.clone(), group_id, topic, self.bus_max_retries));
            let adapter: Arc<dyn agentmesh_bus::Handler> = Arc::new(HandlerAdapter(handler));
            tokio::spawn(group.run_forever(adapter, WATCH_POLL_INTERVAL));
        }
    }

    /// Prefers the durable store's event log; falls back to the
    /// in-memory ring when no store is configured. Returns matches
    /// within `[since, until]`, newest first, capped at `limit`.
    pub async fn query_history(
        &self,
        filter: HistoryFilter,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = if let Some(store) = &self.store {
            store.query_events(0, u32::MAX).await?
        } else {
            self.ring.lock().iter().cloned().collect()
        };
        events.retain(|e| filter.matches(e) && e.timestamp >= since && e.timestamp <= until);
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        Ok(events)
    }

    /// Invoke `callback` for every event published after this call, in
    /// publish order. With a store configured, polls `query_events` at
    /// 100ms (the store has no native watch channel); without one,
    /// drains the facade's own publish broadcast instead.
    pub fn watch_new_events<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(Event) + Send + 'static,
    {
        if let Some(store) = self.store.clone() {
            tokio::spawn(async move {
                let mut last_known = 0u64;
                loop {
                    tokio::time::sleep(WATCH_POLL_INTERVAL).await;
                    match store.query_events(last_known, 1_000).await {
                        Ok(events) => {
                            for event in events {
                                if let Some(seq) = event.sequence {
                                    last_known = last_known.max(seq);
                                }
                                callback(event);
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "watch_new_events poll failed"),
                    }
                }
            })
        } else {
            let mut rx = self.watch_tx.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = rx.recv().await {
                    callback(event);
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_store::memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &Event) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_without_any_backend_still_dispatches_and_rings() {
        let facade = MeshFacade::new("agent-1", None, None);
        let calls = Arc::new(AtomicUsize::new(0));
        facade.subscribe("heartbeat", Arc::new(CountingHandler(calls.clone())), None);

        let event = facade.publish("heartbeat", Value::Null, None).await.unwrap();
        assert!(event.sequence.is_none(), "no store configured, no sequence assigned");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let history = facade
            .query_history(
                HistoryFilter {
                    event_type: Some("heartbeat".into()),
                    ..Default::default()
                },
                event.timestamp - chrono::Duration::seconds(1),
                event.timestamp + chrono::Duration::seconds(1),
                10,
            )
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn publish_with_store_assigns_sequence() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let facade = MeshFacade::new("agent-1", Some(store), None);
        let a = facade.publish("t", Value::Null, None).await.unwrap();
        let b = facade.publish("t", Value::Null, None).await.unwrap();
        assert!(a.sequence.unwrap() < b.sequence.unwrap());
    }

    #[tokio::test]
    async fn query_history_filters_by_source_and_target() {
        let facade = MeshFacade::new("agent-1", None, None);
        facade.publish("t", Value::Null, None).await.unwrap();
        let now = Utc::now();
        let history = facade
            .query_history(
                HistoryFilter {
                    source: Some("agent-2".into()),
                    ..Default::default()
                },
                now - chrono::Duration::seconds(5),
                now + chrono::Duration::seconds(5),
                10,
            )
            .await
            .unwrap();
        assert!(history.is_empty(), "source filter should exclude the other agent's events");
    }

    #[tokio::test]
    async fn handler_error_is_swallowed_not_propagated() {
        struct FailingHandler;
        #[async_trait]
        impl EventHandler for FailingHandler {
            async fn handle(&self, _event: &Event) -> Result<()> {
                Err(agentmesh_domain::Error::HandlerFailed("boom".into()))
            }
        }
        let facade = MeshFacade::new("agent-1", None, None);
        facade.subscribe("t", Arc::new(FailingHandler), None);
        let result = facade.publish("t", Value::Null, None).await;
        assert!(result.is_ok(), "a failing handler must not fail publish");
    }

    #[tokio::test]
    async fn watch_new_events_without_store_observes_published_events() {
        let facade = Arc::new(MeshFacade::new("agent-1", None, None));
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let _handle = facade.watch_new_events(move |_event| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        facade.publish("t", Value::Null, None).await.unwrap();
        // Give the spawned watcher task a chance to observe the broadcast.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
