//! Durable heartbeat scheduler.
//!
//! Hydrates imminent schedules from the store into a hierarchical timing
//! wheel, fires them through a bounded, token-bucket-rate-limited worker
//! pool, and applies coalesce / active-hours / retry semantics before
//! writing run outcomes back. The scheduler is the sole writer of a
//! schedule's `next_run_at`.

mod backoff;
mod cancel;
mod handler;
mod rate_limiter;
mod scheduler;
mod state_cache;

pub use cancel::{CancelMap, CancelToken};
pub use handler::{AgentHandler, RunOutcome};
pub use scheduler::Scheduler;
