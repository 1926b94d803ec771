use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::RunStatus;

/// One row per `agent_id`: the scheduler's view of an agent's health.
/// `consecutive_failures` is the length of the most recent contiguous
/// suffix of `Error`-status runs, and must reset to 0 on any non-error
/// terminal run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_result: Option<RunStatus>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub total_alerts: u64,
}

impl AgentState {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            last_run_at: None,
            next_run_at: None,
            last_result: None,
            last_message: None,
            consecutive_failures: 0,
            total_runs: 0,
            total_alerts: 0,
        }
    }

    /// Fold in the outcome of a completed run.
    pub fn record_run(&mut self, status: RunStatus, message: Option<String>, at: DateTime<Utc>) {
        self.last_run_at = Some(at);
        self.last_result = Some(status);
        self.last_message = message;
        self.total_runs += 1;
        if status.is_failure() {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }
        if status == RunStatus::Alert {
            self.total_alerts += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_failures_tracks_contiguous_error_suffix() {
        let mut s = AgentState::new("agent-1");
        let now = Utc::now();
        s.record_run(RunStatus::Error, None, now);
        s.record_run(RunStatus::Error, None, now);
        assert_eq!(s.consecutive_failures, 2);
        s.record_run(RunStatus::Ok, None, now);
        assert_eq!(s.consecutive_failures, 0);
        s.record_run(RunStatus::Error, None, now);
        assert_eq!(s.consecutive_failures, 1);
    }

    #[test]
    fn total_runs_counts_every_completed_run() {
        let mut s = AgentState::new("agent-1");
        let now = Utc::now();
        s.record_run(RunStatus::Ok, None, now);
        s.record_run(RunStatus::Error, None, now);
        assert_eq!(s.total_runs, 2);
    }

    #[test]
    fn alert_increments_total_alerts_only_on_alert_status() {
        let mut s = AgentState::new("agent-1");
        let now = Utc::now();
        s.record_run(RunStatus::Alert, None, now);
        s.record_run(RunStatus::Ok, None, now);
        assert_eq!(s.total_alerts, 1);
    }
}
