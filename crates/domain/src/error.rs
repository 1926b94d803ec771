/// Shared error type used across all agentmesh crates.
///
/// Variants map onto the failure taxonomy: transient failures are safe to
/// retry with backoff, the rest are terminal for the operation that
/// produced them.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Store or bus temporarily unavailable (lock contention, connection
    /// reset, cluster unreachable). Retryable with backoff.
    #[error("transient: {0}")]
    Transient(String),

    /// A duplicate idempotency key was observed with a conflicting payload.
    #[error("idempotency conflict: {0}")]
    IdempotencyConflict(String),

    /// A subscriber/consumer handler returned an error while processing an
    /// event or run.
    #[error("handler failed: {0}")]
    HandlerFailed(String),

    /// A schedule violates its own contract (duplicate agent id, interval
    /// <= 0, malformed active-hours window).
    #[error("schedule contract violation: {0}")]
    ScheduleContract(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the operation that produced this error is safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
