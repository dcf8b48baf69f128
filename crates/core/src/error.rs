use crate::types::JobId;

/// Domain error taxonomy shared by the store, the engine, and the
/// control endpoint.
///
/// `Conflict` marks a stale transition attempt (the optimistic status
/// guard failed); the engine logs and drops it unless the peer's own
/// request caused it. `BackendUnavailable` is transient and retried
/// internally; `RejectedSpec` is permanent and moves the job to Failed.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict on job {id}: {detail}")]
    Conflict { id: JobId, detail: String },

    #[error("Job {0} already reached a terminal state")]
    AlreadyTerminal(JobId),

    #[error("Scheduler backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Scheduler rejected job spec: {0}")]
    RejectedSpec(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
