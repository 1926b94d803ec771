//! Time-bucketed run analytics.
//!
//! Raw runs are folded into two rollup granularities as they complete —
//! per-minute and per-hour — so `getAnalytics` never has to scan the
//! full run history. The granularity actually used is selected by the
//! requested [`AnalyticsRange`]: short ranges read the minute rollup,
//! longer ones read the hour rollup. An earlier revision of this
//! component always read the hour rollup regardless of range, which
//! made `1h` queries quietly report hour-bucket-aligned data; that is
//! the bug this module exists to not have.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

use agentmesh_domain::{Run, RunStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsRange {
    OneHour,
    OneDay,
    SevenDays,
    ThirtyDays,
}

impl AnalyticsRange {
    fn lookback(self) -> Duration {
        match self {
            AnalyticsRange::OneHour => Duration::hours(1),
            AnalyticsRange::OneDay => Duration::days(1),
            AnalyticsRange::SevenDays => Duration::days(7),
            AnalyticsRange::ThirtyDays => Duration::days(30),
        }
    }

    /// Minute-resolution rollups are only used for the shortest range;
    /// everything coarser reads the hour rollup, which is cheaper to
    /// scan over multi-day windows.
    fn uses_minute_granularity(self) -> bool {
        matches!(self, AnalyticsRange::OneHour)
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct AnalyticsSummary {
    pub agent_id: String,
    pub run_count: u64,
    pub error_count: u64,
    pub alert_count: u64,
    pub avg_duration_ms: f64,
    pub p95_duration_ms: u64,
}

#[derive(Default)]
struct Bucket {
    run_count: u64,
    error_count: u64,
    alert_count: u64,
    durations_ms: Vec<u64>,
}

fn floor_to(instant: DateTime<Utc>, resolution: Duration) -> DateTime<Utc> {
    let res_ms = resolution.num_milliseconds();
    let ms = instant.timestamp_millis();
    let floored = (ms / res_ms) * res_ms;
    DateTime::from_timestamp_millis(floored).unwrap_or(instant)
}

/// Keyed by (agent_id, bucket_start).
type BucketMap = DashMap<(String, DateTime<Utc>), Bucket>;

pub struct Analytics {
    minute_buckets: BucketMap,
    hour_buckets: BucketMap,
    retention: Duration,
}

impl Analytics {
    pub fn new(retention_days: u32) -> Self {
        Self {
            minute_buckets: DashMap::new(),
            hour_buckets: DashMap::new(),
            retention: Duration::days(retention_days.max(1) as i64),
        }
    }

    /// Fold a completed run into both rollup granularities.
    pub fn record_run(&self, agent_id: &str, run: &Run) {
        let Some(duration_ms) = run.duration_ms else {
            return;
        };
        let at = run.completed_at.unwrap_or(run.started_at);
        self.fold(&self.minute_buckets, agent_id, floor_to(at, Duration::minutes(1)), run.status, duration_ms);
        self.fold(&self.hour_buckets, agent_id, floor_to(at, Duration::hours(1)), run.status, duration_ms);
    }

    fn fold(&self, map: &BucketMap, agent_id: &str, bucket_start: DateTime<Utc>, status: RunStatus, duration_ms: u64) {
        let mut entry = map.entry((agent_id.to_string(), bucket_start)).or_default();
        entry.run_count += 1;
        if status.is_failure() {
            entry.error_count += 1;
        }
        if status == RunStatus::Alert {
            entry.alert_count += 1;
        }
        entry.durations_ms.push(duration_ms);
    }

    pub fn get_analytics(&self, agent_id: &str, range: AnalyticsRange) -> AnalyticsSummary {
        let now = Utc::now();
        let since = now - range.lookback();
        let map = if range.uses_minute_granularity() {
            &self.minute_buckets
        } else {
            &self.hour_buckets
        };

        let mut run_count = 0u64;
        let mut error_count = 0u64;
        let mut alert_count = 0u64;
        let mut durations: Vec<u64> = Vec::new();

        for entry in map.iter() {
            let (bucket_agent, bucket_start) = entry.key();
            if bucket_agent != agent_id || *bucket_start < since {
                continue;
            }
            run_count += entry.run_count;
            error_count += entry.error_count;
            alert_count += entry.alert_count;
            durations.extend(entry.durations_ms.iter().copied());
        }

        let avg_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };
        let p95_duration_ms = percentile(&mut durations, 0.95);

        AnalyticsSummary {
            agent_id: agent_id.to_string(),
            run_count,
            error_count,
            alert_count,
            avg_duration_ms,
            p95_duration_ms,
        }
    }

    /// Drop buckets older than the configured retention window.
    pub fn compact(&self) {
        let cutoff = Utc::now() - self.retention;
        self.minute_buckets.retain(|(_, start), _| *start >= cutoff);
        self.hour_buckets.retain(|(_, start), _| *start >= cutoff);
    }
}

fn percentile(values: &mut [u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p).round() as usize;
    values[idx.min(values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn completed_run(agent_id: &str, status: RunStatus, duration_ms: u64, at: DateTime<Utc>) -> Run {
        let mut run = Run::started(Uuid::now_v7(), agent_id);
        run.started_at = at - Duration::milliseconds(duration_ms as i64);
        run = run.complete(status, None);
        run.completed_at = Some(at);
        run.duration_ms = Some(duration_ms);
        run
    }

    #[test]
    fn one_hour_range_uses_minute_granularity() {
        let analytics = Analytics::new(30);
        let now = Utc::now();
        analytics.record_run("agent-1", &completed_run("agent-1", RunStatus::Ok, 100, now));
        let summary = analytics.get_analytics("agent-1", AnalyticsRange::OneHour);
        assert_eq!(summary.run_count, 1);
    }

    #[test]
    fn thirty_day_range_uses_hour_granularity_and_sees_recent_runs() {
        let analytics = Analytics::new(30);
        let now = Utc::now();
        analytics.record_run("agent-1", &completed_run("agent-1", RunStatus::Ok, 100, now));
        let summary = analytics.get_analytics("agent-1", AnalyticsRange::ThirtyDays);
        assert_eq!(summary.run_count, 1);
    }

    #[test]
    fn runs_outside_the_range_are_excluded() {
        let analytics = Analytics::new(30);
        let old = Utc::now() - Duration::days(10);
        analytics.record_run("agent-1", &completed_run("agent-1", RunStatus::Ok, 100, old));
        let summary = analytics.get_analytics("agent-1", AnalyticsRange::OneDay);
        assert_eq!(summary.run_count, 0);
    }

    #[test]
    fn error_and_alert_counts_are_tracked_separately() {
        let analytics = Analytics::new(30);
        let now = Utc::now();
        analytics.record_run("agent-1", &completed_run("agent-1", RunStatus::Error, 50, now));
        analytics.record_run("agent-1", &completed_run("agent-1", RunStatus::Alert, 50, now));
        let summary = analytics.get_analytics("agent-1", AnalyticsRange::OneHour);
        assert_eq!(summary.run_count, 2);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.alert_count, 1);
    }

    #[test]
    fn compact_drops_buckets_past_retention() {
        let analytics = Analytics::new(1);
        let old = Utc::now() - Duration::days(5);
        analytics.record_run("agent-1", &completed_run("agent-1", RunStatus::Ok, 100, old));
        analytics.compact();
        let summary = analytics.get_analytics("agent-1", AnalyticsRange::ThirtyDays);
        assert_eq!(summary.run_count, 0);
    }

    #[test]
    fn agents_are_isolated_from_each_other() {
        let analytics = Analytics::new(30);
        let now = Utc::now();
        analytics.record_run("agent-1", &completed_run("agent-1", RunStatus::Ok, 100, now));
        analytics.record_run("agent-2", &completed_run("agent-2", RunStatus::Ok, 200, now));
        let summary = analytics.get_analytics("agent-1", AnalyticsRange::OneHour);
        assert_eq!(summary.run_count, 1);
    }
}
