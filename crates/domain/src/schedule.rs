use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Time-of-day window, in a named IANA timezone, during which a schedule
/// is allowed to fire. Runs whose `next_run_at` falls outside the window
/// are skipped by the heartbeat scheduler, not cancelled — the schedule's
/// `next_run_at` still advances.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActiveHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// IANA timezone name, e.g. "America/Chicago".
    pub timezone: String,
}

impl ActiveHours {
    /// Whether `instant` falls inside the window, evaluated in `self.timezone`.
    /// Windows that wrap past midnight (`start > end`) are supported.
    pub fn contains(&self, instant: DateTime<Utc>) -> Result<bool> {
        let tz: chrono_tz::Tz = self
            .timezone
            .parse()
            .map_err(|_| Error::ScheduleContract(format!("invalid timezone: {}", self.timezone)))?;
        let local = instant.with_timezone(&tz).time();
        Ok(if self.start <= self.end {
            local >= self.start && local <= self.end
        } else {
            local >= self.start || local <= self.end
        })
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    Active,
    Paused,
    Disabled,
}

/// Persisted, interval-based schedule. One `Schedule` drives at most one
/// agent (`agent_id` is unique); the scheduler owns `next_run_at`
/// advancement exclusively, the store owns everything else.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    /// Unique across all schedules.
    pub agent_id: String,
    /// Fixed interval between runs, in milliseconds. Must be > 0.
    pub interval_ms: u64,
    #[serde(default)]
    pub active_hours: Option<ActiveHours>,
    pub state: ScheduleState,
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Whether this schedule's runs are surfaced on any external status
    /// dashboard.
    #[serde(default = "d_true")]
    pub pub_dashboard: bool,
    /// Whether this schedule's Events are published to the bus at all,
    /// vs. store-only (dashboard/analytics still see them either way).
    #[serde(default = "d_true")]
    pub pub_events: bool,
}

fn d_true() -> bool {
    true
}

impl Schedule {
    pub fn new(agent_id: impl Into<String>, interval_ms: u64) -> Result<Self> {
        if interval_ms == 0 {
            return Err(Error::ScheduleContract(
                "interval_ms must be greater than 0".into(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            agent_id: agent_id.into(),
            interval_ms,
            active_hours: None,
            state: ScheduleState::Active,
            next_run_at: Some(now + chrono::Duration::milliseconds(interval_ms as i64)),
            created_at: now,
            updated_at: now,
            pub_dashboard: true,
            pub_events: true,
        })
    }

    pub fn is_active(&self) -> bool {
        self.state == ScheduleState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn zero_interval_is_rejected() {
        let err = Schedule::new("agent-1", 0).unwrap_err();
        assert!(matches!(err, Error::ScheduleContract(_)));
    }

    #[test]
    fn new_schedule_is_active_and_visible_by_default() {
        let s = Schedule::new("agent-1", 60_000).unwrap();
        assert!(s.is_active());
        assert!(s.pub_dashboard);
        assert!(s.pub_events);
    }

    #[test]
    fn new_schedule_first_run_is_one_interval_out() {
        let s = Schedule::new("agent-1", 60_000).unwrap();
        let next = s.next_run_at.unwrap();
        assert!(next > s.created_at);
        assert_eq!((next - s.created_at).num_milliseconds(), 60_000);
    }

    #[test]
    fn active_hours_simple_window() {
        let hours = ActiveHours {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            timezone: "UTC".into(),
        };
        let inside = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 1, 1, 20, 0, 0).unwrap();
        assert!(hours.contains(inside).unwrap());
        assert!(!hours.contains(outside).unwrap());
    }

    #[test]
    fn active_hours_wraps_midnight() {
        let hours = ActiveHours {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            timezone: "UTC".into(),
        };
        let late_night = Utc.with_ymd_and_hms(2026, 1, 1, 23, 30, 0).unwrap();
        let early_morning = Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap();
        let midday = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(hours.contains(late_night).unwrap());
        assert!(hours.contains(early_morning).unwrap());
        assert!(!hours.contains(midday).unwrap());
    }

    #[test]
    fn invalid_timezone_is_schedule_contract_error() {
        let hours = ActiveHours {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            timezone: "Not/AZone".into(),
        };
        let now = Utc::now();
        assert!(matches!(hours.contains(now), Err(Error::ScheduleContract(_))));
    }
}
