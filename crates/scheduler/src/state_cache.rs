//! Read-through cache over [`Store::get_agent_state`], 60s TTL.
//!
//! Invalidated eagerly whenever the scheduler writes a new `AgentState`,
//! so the TTL only matters for reads that race a concurrent write.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use agentmesh_domain::{AgentState, Result};
use agentmesh_store::Store;

const TTL: Duration = Duration::from_secs(60);

struct Cached {
    state: AgentState,
    fetched_at: Instant,
}

pub struct StateCache {
    store: Arc<dyn Store>,
    cache: DashMap<String, Cached>,
}

impl StateCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    pub async fn get(&self, agent_id: &str) -> Result<Option<AgentState>> {
        if let Some(entry) = self.cache.get(agent_id) {
            if entry.fetched_at.elapsed() < TTL {
                return Ok(Some(entry.state.clone()));
            }
        }
        let fetched = self.store.get_agent_state(agent_id).await?;
        if let Some(state) = &fetched {
            self.cache.insert(
                agent_id.to_string(),
                Cached {
                    state: state.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        Ok(fetched)
    }

    pub fn invalidate(&self, agent_id: &str) {
        self.cache.remove(agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_store::memory::MemoryStore;

    #[tokio::test]
    async fn caches_until_invalidated() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut state = AgentState::new("agent-1");
        state.total_runs = 1;
        store.upsert_agent_state(&state).await.unwrap();

        let cache = StateCache::new(store.clone());
        let first = cache.get("agent-1").await.unwrap().unwrap();
        assert_eq!(first.total_runs, 1);

        let mut updated = state.clone();
        updated.total_runs = 2;
        store.upsert_agent_state(&updated).await.unwrap();

        // Stale read from cache until invalidated.
        let still_cached = cache.get("agent-1").await.unwrap().unwrap();
        assert_eq!(still_cached.total_runs, 1);

        cache.invalidate("agent-1");
        let fresh = cache.get("agent-1").await.unwrap().unwrap();
        assert_eq!(fresh.total_runs, 2);
    }

    #[tokio::test]
    async fn missing_agent_returns_none() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let cache = StateCache::new(store);
        assert!(cache.get("ghost").await.unwrap().is_none());
    }
}
