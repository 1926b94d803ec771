use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An out-of-band control instruction for a schedule, drained by the
/// heartbeat scheduler before it fires a run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Pause,
    Resume,
    RunNow,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub kind: SignalKind,
    #[serde(default)]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub processed: bool,
}

impl Signal {
    pub fn new(schedule_id: Uuid, kind: SignalKind, reason: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            schedule_id,
            kind,
            reason,
            timestamp: Utc::now(),
            processed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_signal_is_unprocessed() {
        let s = Signal::new(Uuid::now_v7(), SignalKind::Pause, None);
        assert!(!s.processed);
    }
}
