use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    OkEmpty,
    OkToken,
    Alert,
    Skipped,
    Error,
    Pending,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Error)
    }
}

/// One execution attempt of a schedule's agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub agent_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub message: Option<String>,
}

impl Run {
    pub fn started(schedule_id: Uuid, agent_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            schedule_id,
            agent_id: agent_id.into(),
            status: RunStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            retry_count: 0,
            message: None,
        }
    }

    pub fn complete(mut self, status: RunStatus, message: Option<String>) -> Self {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_ms = Some(
            (now - self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.status = status;
        self.message = message;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_run_is_pending() {
        let r = Run::started(Uuid::now_v7(), "agent-1");
        assert_eq!(r.status, RunStatus::Pending);
        assert!(r.completed_at.is_none());
    }

    #[test]
    fn complete_sets_duration_and_status() {
        let r = Run::started(Uuid::now_v7(), "agent-1");
        let r = r.complete(RunStatus::Ok, None);
        assert!(r.completed_at.is_some());
        assert!(r.duration_ms.is_some());
        assert!(r.status.is_terminal());
        assert!(!r.status.is_failure());
    }

    #[test]
    fn error_status_is_failure() {
        assert!(RunStatus::Error.is_failure());
        assert!(!RunStatus::Ok.is_failure());
    }
}
