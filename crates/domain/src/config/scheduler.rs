use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Heartbeat scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the hydration loop pulls due schedules into the wheel.
    #[serde(default = "d_hydration_interval_ms")]
    pub hydration_interval_ms: u64,
    /// Schedules with `next_run_at` within this window of now are hydrated.
    #[serde(default = "d_imminent_window_ms")]
    pub imminent_window_ms: u64,
    /// Runs firing within this window of the previous run for the same
    /// agent are coalesced (skipped).
    #[serde(default = "d_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    #[serde(default = "d_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "d_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// Bounded worker pool size for run execution.
    #[serde(default = "d_queue_concurrency")]
    pub queue_concurrency: usize,
    /// Token-bucket rate limit: max runs started per `queue_rate_duration_ms`.
    #[serde(default = "d_queue_rate_max")]
    pub queue_rate_max: u32,
    #[serde(default = "d_queue_rate_duration_ms")]
    pub queue_rate_duration_ms: u64,
    /// URL template invoked to wake an agent, with `{agent_id}`
    /// substituted in. The agent runtime behind it is an external
    /// collaborator; the scheduler only knows how to reach it.
    #[serde(default = "d_agent_callback_url_template")]
    pub agent_callback_url_template: String,
    #[serde(default = "d_agent_callback_timeout_ms")]
    pub agent_callback_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            hydration_interval_ms: d_hydration_interval_ms(),
            imminent_window_ms: d_imminent_window_ms(),
            coalesce_window_ms: d_coalesce_window_ms(),
            max_retries: d_max_retries(),
            initial_retry_delay_ms: d_initial_retry_delay_ms(),
            max_retry_delay_ms: d_max_retry_delay_ms(),
            queue_concurrency: d_queue_concurrency(),
            queue_rate_max: d_queue_rate_max(),
            queue_rate_duration_ms: d_queue_rate_duration_ms(),
            agent_callback_url_template: d_agent_callback_url_template(),
            agent_callback_timeout_ms: d_agent_callback_timeout_ms(),
        }
    }
}

fn d_hydration_interval_ms() -> u64 {
    60_000
}
fn d_imminent_window_ms() -> u64 {
    15 * 60_000
}
fn d_coalesce_window_ms() -> u64 {
    30_000
}
fn d_max_retries() -> u32 {
    5
}
fn d_initial_retry_delay_ms() -> u64 {
    1_000
}
fn d_max_retry_delay_ms() -> u64 {
    5 * 60_000
}
fn d_queue_concurrency() -> usize {
    10
}
fn d_queue_rate_max() -> u32 {
    5
}
fn d_queue_rate_duration_ms() -> u64 {
    1_000
}
fn d_agent_callback_url_template() -> String {
    "http://127.0.0.1:8088/agents/{agent_id}/invoke".into()
}
fn d_agent_callback_timeout_ms() -> u64 {
    30_000
}
