use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::{interval, Duration as TokioDuration};
use uuid::Uuid;

use agentmesh_analytics::Analytics;
use agentmesh_bus::Bus;
use agentmesh_domain::config::SchedulerConfig;
use agentmesh_domain::{AgentState, Event, EventRecord, Result, Run, RunStatus, Schedule, ScheduleState, SignalKind};
use agentmesh_store::Store;
use agentmesh_wheel::TimingWheel;

use crate::backoff::retry_delay_ms;
use crate::cancel::CancelMap;
use crate::handler::{AgentHandler, RunOutcome};
use crate::rate_limiter::TokenBucket;
use crate::state_cache::StateCache;

const STATUS_TOPIC: &str = "schedule-status";

/// Durable heartbeat scheduler: hydrates imminent schedules from the
/// store into a timing wheel, fires them through a bounded, rate-limited
/// worker pool, and applies coalesce / active-hours / retry semantics
/// before writing the outcome back. One logical process per shard; it is
/// the sole writer of `next_run_at`.
pub struct Scheduler {
    store: Arc<dyn Store>,
    bus: Option<Arc<Bus>>,
    handler: Arc<dyn AgentHandler>,
    analytics: Option<Arc<Analytics>>,
    config: SchedulerConfig,
    wheel: Mutex<TimingWheel<Uuid, ()>>,
    state_cache: StateCache,
    rate_limiter: TokenBucket,
    semaphore: Arc<Semaphore>,
    cancels: CancelMap,
    retry_counts: DashMap<Uuid, u32>,
    epoch: DateTime<Utc>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Option<Arc<Bus>>,
        handler: Arc<dyn AgentHandler>,
        analytics: Option<Arc<Analytics>>,
        config: SchedulerConfig,
    ) -> Self {
        let state_cache = StateCache::new(store.clone());
        let rate_limiter = TokenBucket::new(
            config.queue_rate_max,
            TokioDuration::from_millis(config.queue_rate_duration_ms),
        );
        let semaphore = Arc::new(Semaphore::new(config.queue_concurrency.max(1)));
        Self {
            store,
            bus,
            handler,
            analytics,
            config,
            wheel: Mutex::new(TimingWheel::new(0)),
            state_cache,
            rate_limiter,
            semaphore,
            cancels: CancelMap::new(),
            retry_counts: DashMap::new(),
            epoch: Utc::now(),
        }
    }

    fn to_wheel_ms(&self, at: DateTime<Utc>) -> u64 {
        (at - self.epoch).num_milliseconds().max(0) as u64
    }

    /// Cancel a schedule's pending wheel entry and abort its in-flight
    /// run, if any. Returns `true` if either had an effect.
    pub fn cancel_schedule(&self, schedule_id: Uuid) -> bool {
        let wheel_cancelled = self.wheel.lock().cancel(&schedule_id);
        let run_cancelled = self.cancels.cancel(schedule_id);
        wheel_cancelled || run_cancelled
    }

    /// Run the hydration and tick loops until the returned future is
    /// dropped/aborted. Intended to be wrapped in `tokio::spawn`.
    pub async fn run(self: Arc<Self>) {
        let mut hydration = interval(TokioDuration::from_millis(self.config.hydration_interval_ms));
        let mut ticker = interval(TokioDuration::from_millis(TimingWheel::<Uuid, ()>::tick_resolution_ms()));
        loop {
            tokio::select! {
                _ = hydration.tick() => {
                    if let Err(e) = self.hydrate().await {
                        tracing::error!(error = %e, "hydration pass failed");
                    }
                }
                _ = ticker.tick() => {
                    self.clone().tick().await;
                }
            }
        }
    }

    /// Pull schedules due within `imminent_window_ms` into the wheel.
    /// Left in the wheel (never dropped) until a successful write moves
    /// `next_run_at` out of the window, so store unavailability never
    /// loses a timer.
    async fn hydrate(&self) -> Result<()> {
        let before = Utc::now() + ChronoDuration::milliseconds(self.config.imminent_window_ms as i64);
        let due = self.store.due_schedules(before).await?;
        let mut wheel = self.wheel.lock();
        for schedule in due {
            if let Some(next) = schedule.next_run_at {
                wheel.schedule(schedule.id, (), self.to_wheel_ms(next));
            }
        }
        Ok(())
    }

    async fn tick(self: Arc<Self>) {
        let now_ms = self.to_wheel_ms(Utc::now());
        let fired: Vec<Uuid> = {
            let mut wheel = self.wheel.lock();
            wheel.advance(now_ms).into_iter().map(|(id, _)| id).collect()
        };
        for schedule_id in fired {
            let this = self.clone();
            tokio::spawn(async move {
                this.handle_fire(schedule_id).await;
            });
        }
    }

    async fn handle_fire(self: Arc<Self>, schedule_id: Uuid) {
        let Ok(_permit) = self.semaphore.clone().acquire_owned().await else {
            return;
        };
        while !self.rate_limiter.try_acquire() {
            tokio::time::sleep(TokioDuration::from_millis(20)).await;
        }
        if let Err(e) = self.execute(schedule_id).await {
            tracing::error!(schedule_id = %schedule_id, error = %e, "scheduler pass failed");
        }
    }

    async fn execute(&self, schedule_id: Uuid) -> Result<()> {
        let Some(mut schedule) = self.store.get_schedule(schedule_id).await? else {
            self.cancels.remove(schedule_id);
            return Ok(());
        };

        let mut run_now = false;
        for signal in self.store.drain_signals(schedule_id).await? {
            match signal.kind {
                SignalKind::Pause => {
                    self.store
                        .set_schedule_state(schedule_id, ScheduleState::Paused)
                        .await?;
                    self.state_cache.invalidate(&schedule.agent_id);
                    self.emit_status_change(&schedule.agent_id, ScheduleState::Paused).await;
                    return Ok(());
                }
                SignalKind::Resume => {
                    let next = Utc::now() + ChronoDuration::milliseconds(schedule.interval_ms as i64);
                    self.store
                        .set_schedule_state(schedule_id, ScheduleState::Active)
                        .await?;
                    self.store.set_next_run_at(schedule_id, Some(next)).await?;
                    schedule.state = ScheduleState::Active;
                    schedule.next_run_at = Some(next);
                    self.state_cache.invalidate(&schedule.agent_id);
                }
                SignalKind::RunNow => run_now = true,
            }
        }

        if !schedule.is_active() {
            return Ok(());
        }

        let now = Utc::now();

        if !run_now {
            if let Some(state) = self.state_cache.get(&schedule.agent_id).await? {
                if let Some(last) = state.last_run_at {
                    let coalesce_window = ChronoDuration::milliseconds(self.config.coalesce_window_ms as i64);
                    if now - last < coalesce_window {
                        return self.skip(&schedule, now).await;
                    }
                }
            }
        }

        if !run_now {
            if let Some(hours) = &schedule.active_hours {
                if !hours.contains(now)? {
                    return self.skip(&schedule, now).await;
                }
            }
        }

        let cancel = self.cancels.register(schedule_id);
        let run = Run::started(schedule_id, schedule.agent_id.clone());
        self.store.append_run(&run).await?;

        let outcome = self.handler.run(&schedule.agent_id, cancel).await;
        self.cancels.remove(schedule_id);

        if outcome.status.is_failure() {
            self.on_failure(&schedule, run, outcome).await
        } else {
            self.on_success(&schedule, run, outcome).await
        }
    }

    async fn skip(&self, schedule: &Schedule, now: DateTime<Utc>) -> Result<()> {
        let run = Run::started(schedule.id, schedule.agent_id.clone()).complete(RunStatus::Skipped, None);
        self.store.append_run(&run).await?;
        let next = now + ChronoDuration::milliseconds(schedule.interval_ms as i64);
        self.store.set_next_run_at(schedule.id, Some(next)).await?;
        Ok(())
    }

    async fn on_success(&self, schedule: &Schedule, run: Run, outcome: RunOutcome) -> Result<()> {
        self.retry_counts.remove(&schedule.id);
        let run = run.complete(outcome.status, outcome.message.clone());
        self.store.update_run(&run).await?;
        self.record_analytics(&schedule.agent_id, &run);

        let completed_at = run.completed_at.unwrap_or_else(Utc::now);
        let mut state = self
            .state_cache
            .get(&schedule.agent_id)
            .await?
            .unwrap_or_else(|| AgentState::new(schedule.agent_id.clone()));
        state.record_run(run.status, outcome.message, completed_at);
        let next = completed_at + ChronoDuration::milliseconds(schedule.interval_ms as i64);
        state.next_run_at = Some(next);
        self.store.upsert_agent_state(&state).await?;
        self.store.set_next_run_at(schedule.id, Some(next)).await?;
        self.state_cache.invalidate(&schedule.agent_id);
        self.emit_status_change(&schedule.agent_id, schedule.state).await;
        Ok(())
    }

    async fn on_failure(&self, schedule: &Schedule, run: Run, outcome: RunOutcome) -> Result<()> {
        let retry_count = {
            let mut entry = self.retry_counts.entry(schedule.id).or_insert(0);
            let k = *entry;
            *entry += 1;
            k
        };

        let mut run = run.complete(RunStatus::Error, outcome.message.clone());
        run.retry_count = retry_count;
        self.store.update_run(&run).await?;
        self.record_analytics(&schedule.agent_id, &run);

        let completed_at = run.completed_at.unwrap_or_else(Utc::now);
        let mut state = self
            .state_cache
            .get(&schedule.agent_id)
            .await?
            .unwrap_or_else(|| AgentState::new(schedule.agent_id.clone()));
        state.record_run(RunStatus::Error, outcome.message.clone(), completed_at);
        self.store.upsert_agent_state(&state).await?;
        self.state_cache.invalidate(&schedule.agent_id);

        if retry_count < self.config.max_retries {
            let delay = retry_delay_ms(retry_count, self.config.initial_retry_delay_ms, self.config.max_retry_delay_ms);
            let next = Utc::now() + ChronoDuration::milliseconds(delay as i64);
            self.store.set_next_run_at(schedule.id, Some(next)).await?;
            self.wheel.lock().schedule(schedule.id, (), self.to_wheel_ms(next));
        } else {
            self.retry_counts.remove(&schedule.id);
            self.dead_letter(schedule, &run, outcome.message.as_deref()).await;
            let next = Utc::now() + ChronoDuration::milliseconds(schedule.interval_ms as i64);
            self.store.set_next_run_at(schedule.id, Some(next)).await?;
        }
        self.emit_status_change(&schedule.agent_id, schedule.state).await;
        Ok(())
    }

    fn record_analytics(&self, agent_id: &str, run: &Run) {
        if let Some(analytics) = &self.analytics {
            analytics.record_run(agent_id, run);
        }
    }

    async fn dead_letter(&self, schedule: &Schedule, run: &Run, message: Option<&str>) {
        let Some(bus) = &self.bus else { return };
        let data = serde_json::json!({
            "scheduleId": schedule.id,
            "runId": run.id,
            "failedAt": Utc::now(),
            "message": message,
        });
        let event = Event::new("run.exhausted_retries", schedule.agent_id.clone(), data);
        let record = EventRecord::new(event, schedule.agent_id.clone());
        if let Err(e) = bus.publish(agentmesh_bus::DEAD_LETTER_TOPIC, record).await {
            tracing::warn!(schedule_id = %schedule.id, error = %e, "failed to publish dead-letter record");
        }
    }

    async fn emit_status_change(&self, agent_id: &str, state: ScheduleState) {
        let Some(bus) = &self.bus else { return };
        let event = Event::new("schedule.status_changed", agent_id, serde_json::json!({ "state": state }));
        let record = EventRecord::new(event, agent_id);
        if let Err(e) = bus.publish(STATUS_TOPIC, record).await {
            tracing::warn!(agent_id, error = %e, "failed to emit status change");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_domain::{ActiveHours, Schedule, Signal};
    use agentmesh_store::memory::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedHandler {
        calls: AtomicU32,
        fail_first_n: u32,
    }

    #[async_trait]
    impl AgentHandler for ScriptedHandler {
        async fn run(&self, _agent_id: &str, _cancel: crate::cancel::CancelToken) -> RunOutcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                RunOutcome::error("boom")
            } else {
                RunOutcome::ok()
            }
        }
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            hydration_interval_ms: 60_000,
            imminent_window_ms: 900_000,
            coalesce_window_ms: 30_000,
            max_retries: 2,
            initial_retry_delay_ms: 10,
            max_retry_delay_ms: 100,
            queue_concurrency: 4,
            queue_rate_max: 100,
            queue_rate_duration_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn successful_fire_advances_next_run_at_and_clears_failures() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let schedule = Schedule::new("agent-1", 60_000).unwrap();
        let schedule = store.create_schedule(schedule).await.unwrap();

        let handler = Arc::new(ScriptedHandler {
            calls: AtomicU32::new(0),
            fail_first_n: 0,
        });
        let scheduler = Scheduler::new(store.clone(), None, handler, None, fast_config());
        scheduler.execute(schedule.id).await.unwrap();

        let updated = store.get_schedule(schedule.id).await.unwrap().unwrap();
        assert!(updated.next_run_at.unwrap() > schedule.next_run_at.unwrap());
        let state = store.get_agent_state("agent-1").await.unwrap().unwrap();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.total_runs, 1);
    }

    #[tokio::test]
    async fn coalesce_skips_runs_too_soon_after_the_last_one() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let schedule = Schedule::new("agent-1", 60_000).unwrap();
        let schedule = store.create_schedule(schedule).await.unwrap();

        let mut state = AgentState::new("agent-1");
        state.last_run_at = Some(Utc::now());
        store.upsert_agent_state(&state).await.unwrap();

        let handler = Arc::new(ScriptedHandler {
            calls: AtomicU32::new(0),
            fail_first_n: 0,
        });
        let scheduler = Scheduler::new(store.clone(), None, handler.clone(), None, fast_config());
        scheduler.execute(schedule.id).await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0, "run must be coalesced, not executed");
        let runs = store
            .list_runs(agentmesh_store::RunFilter {
                schedule_id: Some(schedule.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Skipped);
    }

    #[tokio::test]
    async fn active_hours_gate_skips_runs_outside_the_window() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut schedule = Schedule::new("agent-1", 60_000).unwrap();
        let now = Utc::now();
        // A one-hour window starting two hours from now in UTC never
        // contains `now`, regardless of when the test runs.
        schedule.active_hours = Some(ActiveHours {
            start: (now + ChronoDuration::hours(2)).time(),
            end: (now + ChronoDuration::hours(3)).time(),
            timezone: "UTC".into(),
        });
        let schedule = store.create_schedule(schedule).await.unwrap();

        let handler = Arc::new(ScriptedHandler {
            calls: AtomicU32::new(0),
            fail_first_n: 0,
        });
        let scheduler = Scheduler::new(store.clone(), None, handler.clone(), None, fast_config());
        scheduler.execute(schedule.id).await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_now_signal_ignores_active_hours_and_coalesce() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let schedule = Schedule::new("agent-1", 60_000).unwrap();
        let schedule = store.create_schedule(schedule).await.unwrap();

        let mut state = AgentState::new("agent-1");
        state.last_run_at = Some(Utc::now());
        store.upsert_agent_state(&state).await.unwrap();
        store
            .enqueue_signal(Signal::new(schedule.id, SignalKind::RunNow, None))
            .await
            .unwrap();

        let handler = Arc::new(ScriptedHandler {
            calls: AtomicU32::new(0),
            fail_first_n: 0,
        });
        let scheduler = Scheduler::new(store.clone(), None, handler.clone(), None, fast_config());
        scheduler.execute(schedule.id).await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pause_signal_stops_the_schedule_without_running() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let schedule = Schedule::new("agent-1", 60_000).unwrap();
        let schedule = store.create_schedule(schedule).await.unwrap();
        store
            .enqueue_signal(Signal::new(schedule.id, SignalKind::Pause, None))
            .await
            .unwrap();

        let handler = Arc::new(ScriptedHandler {
            calls: AtomicU32::new(0),
            fail_first_n: 0,
        });
        let scheduler = Scheduler::new(store.clone(), None, handler.clone(), None, fast_config());
        scheduler.execute(schedule.id).await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        let updated = store.get_schedule(schedule.id).await.unwrap().unwrap();
        assert_eq!(updated.state, ScheduleState::Paused);
    }

    #[tokio::test]
    async fn failure_schedules_a_retry_until_retries_are_exhausted() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let schedule = Schedule::new("agent-1", 60_000).unwrap();
        let schedule = store.create_schedule(schedule).await.unwrap();

        let handler = Arc::new(ScriptedHandler {
            calls: AtomicU32::new(0),
            fail_first_n: 10,
        });
        let scheduler = Scheduler::new(store.clone(), None, handler.clone(), None, fast_config());

        // max_retries = 2: first two failures retry, third dead-letters.
        scheduler.execute(schedule.id).await.unwrap();
        let state = store.get_agent_state("agent-1").await.unwrap().unwrap();
        assert_eq!(state.consecutive_failures, 1);

        scheduler.execute(schedule.id).await.unwrap();
        scheduler.execute(schedule.id).await.unwrap();
        let state = store.get_agent_state("agent-1").await.unwrap().unwrap();
        assert_eq!(state.consecutive_failures, 3);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancel_schedule_removes_pending_wheel_entry() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let schedule = Schedule::new("agent-1", 60_000).unwrap();
        let schedule = store.create_schedule(schedule).await.unwrap();
        let handler = Arc::new(ScriptedHandler {
            calls: AtomicU32::new(0),
            fail_first_n: 0,
        });
        let scheduler = Scheduler::new(store.clone(), None, handler, None, fast_config());
        scheduler.hydrate().await.unwrap();
        assert!(scheduler.cancel_schedule(schedule.id));
    }
}
