use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event bus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Number of partitions per topic.
    #[serde(default = "d_shard_count")]
    pub shard_count: u32,
    #[serde(default = "d_consumer_session_timeout_ms")]
    pub consumer_session_timeout_ms: u64,
    #[serde(default = "d_consumer_heartbeat_interval_ms")]
    pub consumer_heartbeat_interval_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            shard_count: d_shard_count(),
            consumer_session_timeout_ms: d_consumer_session_timeout_ms(),
            consumer_heartbeat_interval_ms: d_consumer_heartbeat_interval_ms(),
        }
    }
}

fn d_shard_count() -> u32 {
    3
}
fn d_consumer_session_timeout_ms() -> u64 {
    10_000
}
fn d_consumer_heartbeat_interval_ms() -> u64 {
    3_000
}
