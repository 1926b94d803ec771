use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Durable state store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The store trait is the same for both profiles; this only selects which
/// backend `Store::open` constructs. Embedded and clustered are a config
/// decision, not a code fork.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "profile", rename_all = "snake_case")]
pub enum StoreConfig {
    Embedded(EmbeddedStoreConfig),
    Clustered(ClusteredStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Embedded(EmbeddedStoreConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedStoreConfig {
    #[serde(default = "d_db_path")]
    pub path: String,
    #[serde(default = "d_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for EmbeddedStoreConfig {
    fn default() -> Self {
        Self {
            path: d_db_path(),
            busy_timeout_ms: d_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteredStoreConfig {
    /// Address of the strictly-serializable KV cluster endpoint.
    pub endpoint: String,
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn d_db_path() -> String {
    "./data/agentmesh.db".into()
}
fn d_busy_timeout_ms() -> u64 {
    5_000
}
fn d_request_timeout_ms() -> u64 {
    2_000
}
