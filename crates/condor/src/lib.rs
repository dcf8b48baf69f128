//! Narrow adapter over the external batch scheduler.
//!
//! The lifecycle engine only sees the [`SchedulerBridge`] trait: submit,
//! cancel, query one handle, enumerate active handles. Everything
//! HTCondor-specific (submit descriptions, CLI invocation, status code
//! mapping) stays behind [`condor::CondorBridge`].

use std::collections::HashSet;

use async_trait::async_trait;
use gridexec_core::spec::JobSpec;
use gridexec_core::types::JobId;

pub mod condor;
pub mod submit_file;

pub use condor::CondorBridge;

/// Identifier the external scheduler assigns to a dispatched unit.
pub type ExternalHandle = String;

/// Scheduler-side view of a dispatched unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalStatus {
    /// Queued or held on the scheduler side, not yet placed.
    Pending,
    /// Placed on a slot and executing.
    Running,
    /// Left the queue normally; a terminal wrapper callback is expected
    /// (or overdue).
    Finished,
    /// The scheduler has no record of the handle. An anomaly: resolved
    /// by reconciliation, never treated as success.
    Missing,
}

/// Bridge failures, split by retryability.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Transient: scheduler unreachable, call timed out. Retried with
    /// backoff by the engine.
    #[error("Scheduler backend unavailable: {0}")]
    Unavailable(String),

    /// Permanent: the scheduler rejected this spec. Not retried.
    #[error("Scheduler rejected submission: {0}")]
    Rejected(String),
}

/// Job-control operations of the external batch scheduler.
#[async_trait]
pub trait SchedulerBridge: Send + Sync {
    /// Request a new scheduled unit for `spec`; returns the handle the
    /// scheduler assigned.
    async fn submit(
        &self,
        job_id: JobId,
        spec: &JobSpec,
        attempt: u32,
    ) -> Result<ExternalHandle, BridgeError>;

    /// Best-effort removal. A handle the scheduler no longer knows is
    /// treated as already cancelled, not an error.
    async fn cancel(&self, handle: &str) -> Result<(), BridgeError>;

    /// Current scheduler-side status of one handle.
    async fn query_status(&self, handle: &str) -> Result<ExternalStatus, BridgeError>;

    /// Handles the scheduler currently tracks for this daemon. Used to
    /// find orphans (external only) and lost jobs (internal only).
    async fn list_active_handles(&self) -> Result<HashSet<ExternalHandle>, BridgeError>;
}
