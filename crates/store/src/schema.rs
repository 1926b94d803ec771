use rusqlite::{Connection, Result};

/// Bump when the table shape changes; `init_schema` rebuilds from scratch
/// on mismatch, since the store holds no data worth migrating in place
/// yet.
pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id              TEXT PRIMARY KEY,
            agent_id        TEXT NOT NULL UNIQUE,
            interval_ms     INTEGER NOT NULL,
            active_hours    TEXT,
            state           TEXT NOT NULL,
            next_run_at     TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            pub_dashboard   INTEGER NOT NULL DEFAULT 1,
            pub_events      INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS runs (
            id              TEXT PRIMARY KEY,
            schedule_id     TEXT NOT NULL,
            agent_id        TEXT NOT NULL,
            status          TEXT NOT NULL,
            started_at      TEXT NOT NULL,
            completed_at    TEXT,
            duration_ms     INTEGER,
            retry_count     INTEGER NOT NULL DEFAULT 0,
            message         TEXT,
            FOREIGN KEY (schedule_id) REFERENCES schedules(id)
        );

        CREATE TABLE IF NOT EXISTS agent_states (
            agent_id                TEXT PRIMARY KEY,
            last_run_at             TEXT,
            next_run_at             TEXT,
            last_result             TEXT,
            last_message            TEXT,
            consecutive_failures    INTEGER NOT NULL DEFAULT 0,
            total_runs              INTEGER NOT NULL DEFAULT 0,
            total_alerts            INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS signals (
            id              TEXT PRIMARY KEY,
            schedule_id     TEXT NOT NULL,
            kind            TEXT NOT NULL,
            reason          TEXT,
            timestamp       TEXT NOT NULL,
            processed       INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS events (
            sequence        INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            type            TEXT NOT NULL,
            source          TEXT NOT NULL,
            target          TEXT,
            timestamp       TEXT NOT NULL,
            data            TEXT NOT NULL,
            metadata        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_runs_schedule ON runs(schedule_id);
        CREATE INDEX IF NOT EXISTS idx_runs_agent ON runs(agent_id);
        CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at DESC);
        CREATE INDEX IF NOT EXISTS idx_signals_schedule ON signals(schedule_id, processed);
        CREATE INDEX IF NOT EXISTS idx_schedules_next_run ON schedules(state, next_run_at);
        CREATE INDEX IF NOT EXISTS idx_events_target ON events(target);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS events;
        DROP TABLE IF EXISTS signals;
        DROP TABLE IF EXISTS agent_states;
        DROP TABLE IF EXISTS runs;
        DROP TABLE IF EXISTS schedules;
        "#,
    )?;
    Ok(())
}
