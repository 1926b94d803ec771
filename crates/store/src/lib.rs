//! Durable state store.
//!
//! Exclusively owns persistence for schedules, runs, agent state, signals
//! and the event log. The embedded and clustered profiles implement the
//! same [`Store`] trait — selecting one over the other is a configuration
//! decision (`agentmesh_domain::config::StoreConfig`), not a code fork.
//! Only the embedded (SQLite/WAL) backend ships here: a strictly
//! serializable clustered KV backend is a real external service this
//! workspace has no business fabricating a client for.

mod schema;
mod sqlite;

pub mod memory;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use agentmesh_domain::{AgentState, Event, Result, Run, RunStatus, Schedule, ScheduleState, Signal};

/// Optional filters for [`Store::list_runs`].
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub schedule_id: Option<Uuid>,
    pub agent_id: Option<String>,
    pub status: Option<RunStatus>,
    pub limit: u32,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ── Schedules ────────────────────────────────────────────────────
    async fn create_schedule(&self, schedule: Schedule) -> Result<Schedule>;
    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>>;
    async fn get_schedule_by_agent(&self, agent_id: &str) -> Result<Option<Schedule>>;
    async fn list_schedules(&self) -> Result<Vec<Schedule>>;
    async fn set_schedule_state(&self, id: Uuid, state: ScheduleState) -> Result<()>;
    /// Exclusively called by the scheduler to advance `next_run_at`.
    async fn set_next_run_at(&self, id: Uuid, next_run_at: Option<DateTime<Utc>>) -> Result<()>;
    /// Active schedules whose `next_run_at` is at or before `before`.
    async fn due_schedules(&self, before: DateTime<Utc>) -> Result<Vec<Schedule>>;

    // ── Runs ─────────────────────────────────────────────────────────
    async fn append_run(&self, run: &Run) -> Result<()>;
    async fn update_run(&self, run: &Run) -> Result<()>;
    async fn list_runs(&self, filter: RunFilter) -> Result<Vec<Run>>;

    // ── Agent state ──────────────────────────────────────────────────
    async fn upsert_agent_state(&self, state: &AgentState) -> Result<()>;
    async fn get_agent_state(&self, agent_id: &str) -> Result<Option<AgentState>>;

    // ── Signals ──────────────────────────────────────────────────────
    async fn enqueue_signal(&self, signal: Signal) -> Result<()>;
    /// Returns and marks processed every unprocessed signal for `schedule_id`,
    /// oldest first.
    async fn drain_signals(&self, schedule_id: Uuid) -> Result<Vec<Signal>>;

    // ── Event log ────────────────────────────────────────────────────
    /// Appends `event` and assigns it the next strictly increasing
    /// `sequence`. Only the unified mesh facade's `publish()` calls this —
    /// by construction it is the sole sequence-assignor in the system.
    async fn append_event(&self, event: Event) -> Result<Event>;
    async fn query_events(&self, since_sequence: u64, limit: u32) -> Result<Vec<Event>>;
}
