//! Per-run abort signals, keyed by schedule id.
//!
//! One schedule fires at most one run at a time, so there is no group
//! fan-out here — just a token the worker checks and a map the scheduler
//! uses to reach it from `cancel_schedule`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CancelMap {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Register a fresh token for `schedule_id`'s in-flight run.
    pub fn register(&self, schedule_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(schedule_id, token.clone());
        token
    }

    /// Cancel the in-flight run for `schedule_id`, if any.
    pub fn cancel(&self, schedule_id: Uuid) -> bool {
        if let Some(token) = self.tokens.lock().get(&schedule_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn remove(&self, schedule_id: Uuid) {
        self.tokens.lock().remove(&schedule_id);
    }

    pub fn is_running(&self, schedule_id: Uuid) -> bool {
        self.tokens.lock().contains_key(&schedule_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_cancel_flips_token() {
        let map = CancelMap::new();
        let id = Uuid::now_v7();
        let token = map.register(id);
        assert!(!token.is_cancelled());
        assert!(map.cancel(id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_unknown_schedule_returns_false() {
        let map = CancelMap::new();
        assert!(!map.cancel(Uuid::now_v7()));
    }

    #[test]
    fn remove_clears_running_state() {
        let map = CancelMap::new();
        let id = Uuid::now_v7();
        map.register(id);
        assert!(map.is_running(id));
        map.remove(id);
        assert!(!map.is_running(id));
    }
}
