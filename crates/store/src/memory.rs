//! In-process `Store` implementation. Used by tests and by other crates'
//! unit tests that need a `Store` without touching disk.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use agentmesh_domain::{AgentState, Event, Result, Run, RunStatus, Schedule, ScheduleState, Signal};

use crate::{RunFilter, Store};

#[derive(Default)]
struct Inner {
    schedules: HashMap<Uuid, Schedule>,
    runs: HashMap<Uuid, Run>,
    agent_states: HashMap<String, AgentState>,
    signals: HashMap<Uuid, Vec<Signal>>,
    events: Vec<Event>,
}

pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    next_sequence: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            next_sequence: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_schedule(&self, schedule: Schedule) -> Result<Schedule> {
        self.inner.write().schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>> {
        Ok(self.inner.read().schedules.get(&id).cloned())
    }

    async fn get_schedule_by_agent(&self, agent_id: &str) -> Result<Option<Schedule>> {
        Ok(self
            .inner
            .read()
            .schedules
            .values()
            .find(|s| s.agent_id == agent_id)
            .cloned())
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        Ok(self.inner.read().schedules.values().cloned().collect())
    }

    async fn set_schedule_state(&self, id: Uuid, state: ScheduleState) -> Result<()> {
        if let Some(s) = self.inner.write().schedules.get_mut(&id) {
            s.state = state;
            s.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_next_run_at(&self, id: Uuid, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        if let Some(s) = self.inner.write().schedules.get_mut(&id) {
            s.next_run_at = next_run_at;
            s.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn due_schedules(&self, before: DateTime<Utc>) -> Result<Vec<Schedule>> {
        let mut due: Vec<Schedule> = self
            .inner
            .read()
            .schedules
            .values()
            .filter(|s| s.is_active() && s.next_run_at.map(|t| t <= before).unwrap_or(false))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_at);
        Ok(due)
    }

    async fn append_run(&self, run: &Run) -> Result<()> {
        self.inner.write().runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        self.inner.write().runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn list_runs(&self, filter: RunFilter) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .inner
            .read()
            .runs
            .values()
            .filter(|r| filter.schedule_id.map(|id| id == r.schedule_id).unwrap_or(true))
            .filter(|r| {
                filter
                    .agent_id
                    .as_ref()
                    .map(|a| a == &r.agent_id)
                    .unwrap_or(true)
            })
            .filter(|r| filter.status.map(|s| s == r.status).unwrap_or(true))
            .cloned()
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse(r.started_at));
        if filter.limit > 0 {
            runs.truncate(filter.limit as usize);
        }
        Ok(runs)
    }

    async fn upsert_agent_state(&self, state: &AgentState) -> Result<()> {
        self.inner
            .write()
            .agent_states
            .insert(state.agent_id.clone(), state.clone());
        Ok(())
    }

    async fn get_agent_state(&self, agent_id: &str) -> Result<Option<AgentState>> {
        Ok(self.inner.read().agent_states.get(agent_id).cloned())
    }

    async fn enqueue_signal(&self, signal: Signal) -> Result<()> {
        self.inner
            .write()
            .signals
            .entry(signal.schedule_id)
            .or_default()
            .push(signal);
        Ok(())
    }

    async fn drain_signals(&self, schedule_id: Uuid) -> Result<Vec<Signal>> {
        let mut guard = self.inner.write();
        let pending = guard.signals.entry(schedule_id).or_default();
        let drained: Vec<Signal> = pending
            .drain(..)
            .map(|mut s| {
                s.processed = true;
                s
            })
            .collect();
        Ok(drained)
    }

    async fn append_event(&self, mut event: Event) -> Result<Event> {
        let seq = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        event.sequence = Some(seq);
        self.inner.write().events.push(event.clone());
        Ok(event)
    }

    async fn query_events(&self, since_sequence: u64, limit: u32) -> Result<Vec<Event>> {
        let guard = self.inner.read();
        let mut out: Vec<Event> = guard
            .events
            .iter()
            .filter(|e| e.sequence.unwrap_or(0) > since_sequence)
            .cloned()
            .collect();
        out.truncate(limit.max(1) as usize);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_domain::RunStatus;

    #[tokio::test]
    async fn sequence_is_monotonic_across_appends() {
        let store = MemoryStore::new();
        let e1 = store
            .append_event(Event::new("a", "s", serde_json::Value::Null))
            .await
            .unwrap();
        let e2 = store
            .append_event(Event::new("b", "s", serde_json::Value::Null))
            .await
            .unwrap();
        assert!(e2.sequence.unwrap() > e1.sequence.unwrap());
    }

    #[tokio::test]
    async fn list_runs_filters_by_status() {
        let store = MemoryStore::new();
        let ok = Run::started(Uuid::now_v7(), "agent-1").complete(RunStatus::Ok, None);
        let err = Run::started(Uuid::now_v7(), "agent-1").complete(RunStatus::Error, None);
        store.append_run(&ok).await.unwrap();
        store.append_run(&err).await.unwrap();
        let errors = store
            .list_runs(RunFilter {
                status: Some(RunStatus::Error),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].status, RunStatus::Error);
    }
}
