use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analytics rollups
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// How long raw per-event rows are retained before the rollups alone
    /// remain queryable.
    #[serde(default = "d_retention_days")]
    pub retention_days: u32,
    #[serde(default = "d_compaction_interval_ms")]
    pub compaction_interval_ms: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            retention_days: d_retention_days(),
            compaction_interval_ms: d_compaction_interval_ms(),
        }
    }
}

fn d_retention_days() -> u32 {
    30
}
fn d_compaction_interval_ms() -> u64 {
    60 * 60_000
}
