use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use agentmesh_domain::{
    AgentState, Error, Event, Result, Run, RunStatus, Schedule, ScheduleState, Signal, SignalKind,
};

use crate::{schema, RunFilter, Store};

/// Map a low-level `rusqlite` failure onto the shared error taxonomy.
/// Busy/locked errors are transient and safe to retry; everything else is
/// treated as an unexpected store fault.
fn map_err(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::DatabaseBusy
                || err.code == rusqlite::ErrorCode::DatabaseLocked =>
        {
            Error::Transient(e.to_string())
        }
        _ => Error::Other(format!("store: {e}")),
    }
}

/// Embedded SQLite-backed store: WAL journal mode plus a bounded busy
/// timeout so concurrent short transactions queue instead of failing
/// outright.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path, busy_timeout_ms: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(map_err)?;
        Self::configure(&conn, busy_timeout_ms)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_err)?;
        Self::configure(&conn, 5_000)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure(conn: &Connection, busy_timeout_ms: u64) -> Result<()> {
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
            .map_err(map_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(map_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(map_err)?;
        schema::init_schema(conn).map_err(map_err)?;
        Ok(())
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| Error::Other(format!("store task join: {e}")))?
        .map_err(map_err)
    }
}

// ── row <-> domain mapping ───────────────────────────────────────────

fn schedule_from_row(row: &rusqlite::Row) -> rusqlite::Result<Schedule> {
    let id: String = row.get("id")?;
    let active_hours: Option<String> = row.get("active_hours")?;
    let state: String = row.get("state")?;
    let next_run_at: Option<String> = row.get("next_run_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Schedule {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        agent_id: row.get("agent_id")?,
        interval_ms: row.get::<_, i64>("interval_ms")? as u64,
        active_hours: active_hours.and_then(|s| serde_json::from_str(&s).ok()),
        state: match state.as_str() {
            "active" => ScheduleState::Active,
            "paused" => ScheduleState::Paused,
            _ => ScheduleState::Disabled,
        },
        next_run_at: next_run_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))),
        created_at: DateTime::parse_from_rfc3339(&created_at).unwrap().with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at).unwrap().with_timezone(&Utc),
        pub_dashboard: row.get::<_, i64>("pub_dashboard")? != 0,
        pub_events: row.get::<_, i64>("pub_events")? != 0,
    })
}

fn state_str(s: ScheduleState) -> &'static str {
    match s {
        ScheduleState::Active => "active",
        ScheduleState::Paused => "paused",
        ScheduleState::Disabled => "disabled",
    }
}

fn run_status_str(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Ok => "ok",
        RunStatus::OkEmpty => "ok_empty",
        RunStatus::OkToken => "ok_token",
        RunStatus::Alert => "alert",
        RunStatus::Skipped => "skipped",
        RunStatus::Error => "error",
        RunStatus::Pending => "pending",
    }
}

fn run_status_from_str(s: &str) -> RunStatus {
    match s {
        "ok" => RunStatus::Ok,
        "ok_empty" => RunStatus::OkEmpty,
        "ok_token" => RunStatus::OkToken,
        "alert" => RunStatus::Alert,
        "skipped" => RunStatus::Skipped,
        "error" => RunStatus::Error,
        _ => RunStatus::Pending,
    }
}

fn run_from_row(row: &rusqlite::Row) -> rusqlite::Result<Run> {
    let id: String = row.get("id")?;
    let schedule_id: String = row.get("schedule_id")?;
    let started_at: String = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let status: String = row.get("status")?;
    Ok(Run {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        schedule_id: Uuid::parse_str(&schedule_id).unwrap_or_default(),
        agent_id: row.get("agent_id")?,
        status: run_status_from_str(&status),
        started_at: DateTime::parse_from_rfc3339(&started_at).unwrap().with_timezone(&Utc),
        completed_at: completed_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))),
        duration_ms: row.get::<_, Option<i64>>("duration_ms")?.map(|v| v as u64),
        retry_count: row.get::<_, i64>("retry_count")? as u32,
        message: row.get("message")?,
    })
}

fn agent_state_from_row(row: &rusqlite::Row) -> rusqlite::Result<AgentState> {
    let last_run_at: Option<String> = row.get("last_run_at")?;
    let next_run_at: Option<String> = row.get("next_run_at")?;
    let last_result: Option<String> = row.get("last_result")?;
    Ok(AgentState {
        agent_id: row.get("agent_id")?,
        last_run_at: last_run_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))),
        next_run_at: next_run_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))),
        last_result: last_result.map(|s| run_status_from_str(&s)),
        last_message: row.get("last_message")?,
        consecutive_failures: row.get::<_, i64>("consecutive_failures")? as u32,
        total_runs: row.get::<_, i64>("total_runs")? as u64,
        total_alerts: row.get::<_, i64>("total_alerts")? as u64,
    })
}

fn signal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Signal> {
    let id: String = row.get("id")?;
    let schedule_id: String = row.get("schedule_id")?;
    let kind: String = row.get("kind")?;
    let timestamp: String = row.get("timestamp")?;
    Ok(Signal {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        schedule_id: Uuid::parse_str(&schedule_id).unwrap_or_default(),
        kind: match kind.as_str() {
            "pause" => SignalKind::Pause,
            "resume" => SignalKind::Resume,
            _ => SignalKind::RunNow,
        },
        reason: row.get("reason")?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp).unwrap().with_timezone(&Utc),
        processed: row.get::<_, i64>("processed")? != 0,
    })
}

fn signal_kind_str(k: SignalKind) -> &'static str {
    match k {
        SignalKind::Pause => "pause",
        SignalKind::Resume => "resume",
        SignalKind::RunNow => "run_now",
    }
}

fn event_from_row(row: &rusqlite::Row) -> rusqlite::Result<Event> {
    let id: String = row.get("id")?;
    let timestamp: String = row.get("timestamp")?;
    let data: String = row.get("data")?;
    let metadata: String = row.get("metadata")?;
    Ok(Event {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        event_type: row.get("type")?,
        source: row.get("source")?,
        target: row.get("target")?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp).unwrap().with_timezone(&Utc),
        data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        sequence: Some(row.get::<_, i64>("sequence")? as u64),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_schedule(&self, schedule: Schedule) -> Result<Schedule> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO schedules (id, agent_id, interval_ms, active_hours, state, next_run_at, created_at, updated_at, pub_dashboard, pub_events)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    schedule.id.to_string(),
                    schedule.agent_id,
                    schedule.interval_ms as i64,
                    schedule.active_hours.as_ref().map(|h| serde_json::to_string(h).unwrap()),
                    state_str(schedule.state),
                    schedule.next_run_at.map(|d| d.to_rfc3339()),
                    schedule.created_at.to_rfc3339(),
                    schedule.updated_at.to_rfc3339(),
                    schedule.pub_dashboard as i64,
                    schedule.pub_events as i64,
                ],
            )?;
            Ok(schedule)
        })
        .await
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM schedules WHERE id = ?1",
                params![id.to_string()],
                schedule_from_row,
            )
            .optional()
        })
        .await
    }

    async fn get_schedule_by_agent(&self, agent_id: &str) -> Result<Option<Schedule>> {
        let agent_id = agent_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM schedules WHERE agent_id = ?1",
                params![agent_id],
                schedule_from_row,
            )
            .optional()
        })
        .await
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM schedules ORDER BY created_at")?;
            let rows = stmt.query_map([], schedule_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn set_schedule_state(&self, id: Uuid, state: ScheduleState) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE schedules SET state = ?1, updated_at = ?2 WHERE id = ?3",
                params![state_str(state), Utc::now().to_rfc3339(), id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_next_run_at(&self, id: Uuid, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE schedules SET next_run_at = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    next_run_at.map(|d| d.to_rfc3339()),
                    Utc::now().to_rfc3339(),
                    id.to_string()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn due_schedules(&self, before: DateTime<Utc>) -> Result<Vec<Schedule>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM schedules WHERE state = 'active' AND next_run_at IS NOT NULL AND next_run_at <= ?1 ORDER BY next_run_at",
            )?;
            let rows = stmt.query_map(params![before.to_rfc3339()], schedule_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn append_run(&self, run: &Run) -> Result<()> {
        let run = run.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO runs (id, schedule_id, agent_id, status, started_at, completed_at, duration_ms, retry_count, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run.id.to_string(),
                    run.schedule_id.to_string(),
                    run.agent_id,
                    run_status_str(run.status),
                    run.started_at.to_rfc3339(),
                    run.completed_at.map(|d| d.to_rfc3339()),
                    run.duration_ms.map(|v| v as i64),
                    run.retry_count as i64,
                    run.message,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        let run = run.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE runs SET status = ?1, completed_at = ?2, duration_ms = ?3, retry_count = ?4, message = ?5 WHERE id = ?6",
                params![
                    run_status_str(run.status),
                    run.completed_at.map(|d| d.to_rfc3339()),
                    run.duration_ms.map(|v| v as i64),
                    run.retry_count as i64,
                    run.message,
                    run.id.to_string(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_runs(&self, filter: RunFilter) -> Result<Vec<Run>> {
        self.with_conn(move |conn| {
            let mut sql = String::from("SELECT * FROM runs WHERE 1=1");
            let mut binds: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(id) = filter.schedule_id {
                sql.push_str(" AND schedule_id = ?");
                binds.push(Box::new(id.to_string()));
            }
            if let Some(agent_id) = &filter.agent_id {
                sql.push_str(" AND agent_id = ?");
                binds.push(Box::new(agent_id.clone()));
            }
            if let Some(status) = filter.status {
                sql.push_str(" AND status = ?");
                binds.push(Box::new(run_status_str(status)));
            }
            sql.push_str(" ORDER BY started_at DESC");
            if filter.limit > 0 {
                sql.push_str(&format!(" LIMIT {}", filter.limit));
            }
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> = binds.iter().map(|b| b.as_ref()).collect();
            let rows = stmt.query_map(params.as_slice(), run_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn upsert_agent_state(&self, state: &AgentState) -> Result<()> {
        let state = state.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO agent_states (agent_id, last_run_at, next_run_at, last_result, last_message, consecutive_failures, total_runs, total_alerts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(agent_id) DO UPDATE SET
                   last_run_at = excluded.last_run_at,
                   next_run_at = excluded.next_run_at,
                   last_result = excluded.last_result,
                   last_message = excluded.last_message,
                   consecutive_failures = excluded.consecutive_failures,
                   total_runs = excluded.total_runs,
                   total_alerts = excluded.total_alerts",
                params![
                    state.agent_id,
                    state.last_run_at.map(|d| d.to_rfc3339()),
                    state.next_run_at.map(|d| d.to_rfc3339()),
                    state.last_result.map(run_status_str),
                    state.last_message,
                    state.consecutive_failures as i64,
                    state.total_runs as i64,
                    state.total_alerts as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_agent_state(&self, agent_id: &str) -> Result<Option<AgentState>> {
        let agent_id = agent_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT * FROM agent_states WHERE agent_id = ?1",
                params![agent_id],
                agent_state_from_row,
            )
            .optional()
        })
        .await
    }

    async fn enqueue_signal(&self, signal: Signal) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO signals (id, schedule_id, kind, reason, timestamp, processed)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    signal.id.to_string(),
                    signal.schedule_id.to_string(),
                    signal_kind_str(signal.kind),
                    signal.reason,
                    signal.timestamp.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn drain_signals(&self, schedule_id: Uuid) -> Result<Vec<Signal>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM signals WHERE schedule_id = ?1 AND processed = 0 ORDER BY timestamp",
            )?;
            let mut signals: Vec<Signal> = stmt
                .query_map(params![schedule_id.to_string()], signal_from_row)?
                .collect::<rusqlite::Result<_>>()?;
            conn.execute(
                "UPDATE signals SET processed = 1 WHERE schedule_id = ?1 AND processed = 0",
                params![schedule_id.to_string()],
            )?;
            for s in &mut signals {
                s.processed = true;
            }
            Ok(signals)
        })
        .await
    }

    async fn append_event(&self, mut event: Event) -> Result<Event> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO events (id, type, source, target, timestamp, data, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.id.to_string(),
                    event.event_type,
                    event.source,
                    event.target,
                    event.timestamp.to_rfc3339(),
                    serde_json::to_string(&event.data).unwrap_or_default(),
                    serde_json::to_string(&event.metadata).unwrap_or_default(),
                ],
            )?;
            event.sequence = Some(conn.last_insert_rowid() as u64);
            Ok(event)
        })
        .await
    }

    async fn query_events(&self, since_sequence: u64, limit: u32) -> Result<Vec<Event>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM events WHERE sequence > ?1 ORDER BY sequence LIMIT ?2",
            )?;
            let rows = stmt.query_map(
                params![since_sequence as i64, limit.max(1) as i64],
                event_from_row,
            )?;
            rows.collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_domain::Run;

    fn test_schedule() -> Schedule {
        Schedule::new("agent-1", 60_000).unwrap()
    }

    #[tokio::test]
    async fn create_and_get_schedule_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let s = store.create_schedule(test_schedule()).await.unwrap();
        let fetched = store.get_schedule(s.id).await.unwrap().unwrap();
        assert_eq!(fetched.agent_id, "agent-1");
        assert_eq!(fetched.interval_ms, 60_000);
    }

    #[tokio::test]
    async fn due_schedules_respects_next_run_at() {
        let store = SqliteStore::open_in_memory().unwrap();
        let s = store.create_schedule(test_schedule()).await.unwrap();
        let future = Utc::now() + chrono::Duration::hours(1);
        store.set_next_run_at(s.id, Some(future)).await.unwrap();
        let due = store.due_schedules(Utc::now()).await.unwrap();
        assert!(due.is_empty());

        let past = Utc::now() - chrono::Duration::seconds(1);
        store.set_next_run_at(s.id, Some(past)).await.unwrap();
        let due = store.due_schedules(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn signals_drain_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let s = store.create_schedule(test_schedule()).await.unwrap();
        store
            .enqueue_signal(Signal::new(s.id, SignalKind::Pause, None))
            .await
            .unwrap();
        let drained = store.drain_signals(s.id).await.unwrap();
        assert_eq!(drained.len(), 1);
        let drained_again = store.drain_signals(s.id).await.unwrap();
        assert!(drained_again.is_empty());
    }

    #[tokio::test]
    async fn event_sequence_is_strictly_increasing() {
        let store = SqliteStore::open_in_memory().unwrap();
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
    async fn run_lifecycle_persists() {
        let store = SqliteStore::open_in_memory().unwrap();
        let s = store.create_schedule(test_schedule()).await.unwrap();
        let run = Run::started(s.id, "agent-1");
        store.append_run(&run).await.unwrap();
        let completed = run.clone().complete(RunStatus::Ok, Some("done".into()));
        store.update_run(&completed).await.unwrap();
        let runs = store
            .list_runs(RunFilter {
                schedule_id: Some(s.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Ok);
    }
}
