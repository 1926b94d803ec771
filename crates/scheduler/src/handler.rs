//! The callable entry point the scheduler invokes on each fire.

use async_trait::async_trait;

use agentmesh_domain::RunStatus;

use crate::cancel::CancelToken;

/// What a single agent invocation reported back.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub message: Option<String>,
}

impl RunOutcome {
    pub fn ok() -> Self {
        Self {
            status: RunStatus::Ok,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            message: Some(message.into()),
        }
    }

    /// A run that was cancelled mid-flight. Not a failure: the scheduler
    /// records it with status `Skipped` and doesn't touch the retry ladder.
    pub fn cancelled() -> Self {
        Self {
            status: RunStatus::Skipped,
            message: Some("cancelled".into()),
        }
    }
}

/// Implemented by whatever actually wakes an agent up. The scheduler
/// treats `cancel` as authoritative: once it observes `is_cancelled()`
/// it stops waiting on the call and records the run as cancelled, not
/// as a failure.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn run(&self, agent_id: &str, cancel: CancelToken) -> RunOutcome;
}
