//! FIFO dispatch of the Queued backlog to the external scheduler.
//!
//! One pass per tick: submit Queued jobs oldest-first. A transient
//! scheduler failure stops the pass and arms a capped exponential
//! backoff so an unreachable schedd is not hammered once a second.

use std::time::{Duration, Instant};

use gridexec_condor::BridgeError;
use gridexec_core::error::CoreError;
use gridexec_db::models::status::JobStatus;
use gridexec_db::JobUpdate;

use crate::engine::LifecycleEngine;

/// Capped exponential backoff armed by transient submit failures.
#[derive(Debug)]
pub struct SubmitBackoff {
    initial: Duration,
    cap: Duration,
    delay: Duration,
    until: Option<Instant>,
}

impl SubmitBackoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            initial,
            cap,
            delay: initial,
            until: None,
        }
    }

    /// Whether dispatch is currently paused.
    pub fn is_blocked(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    /// Arm the gate and double the next delay. Returns the delay that
    /// was applied.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        let applied = self.delay;
        self.until = Some(now + applied);
        self.delay = next_delay(self.delay, self.cap);
        applied
    }

    /// A successful submit clears the gate and the growth.
    pub fn reset(&mut self) {
        self.delay = self.initial;
        self.until = None;
    }
}

/// Double `current`, clamped to `cap`.
fn next_delay(current: Duration, cap: Duration) -> Duration {
    Duration::from_millis((current.as_millis() as u64).saturating_mul(2)).min(cap)
}

impl LifecycleEngine {
    /// One dispatch pass over the Queued backlog, oldest first.
    pub async fn dispatch_pass(&mut self) -> Result<(), CoreError> {
        if self.backoff.is_blocked(Instant::now()) {
            return Ok(());
        }

        let queued: Vec<_> = self
            .store
            .list_active()
            .await?
            .into_iter()
            .filter(|job| job.status() == Some(JobStatus::Queued))
            .collect();

        for job in queued {
            match self
                .bridge
                .submit(job.id, &job.spec.0, job.attempt as u32)
                .await
            {
                Ok(handle) => {
                    self.backoff.reset();
                    tracing::info!(
                        job_id = job.id,
                        handle = %handle,
                        attempt = job.attempt,
                        "Job dispatched",
                    );
                    let update = JobUpdate::to(JobStatus::Dispatched).external_handle(handle);
                    self.store
                        .transition(job.id, JobStatus::Queued, update)
                        .await?;
                }
                Err(BridgeError::Rejected(reason)) => {
                    // Permanent: this spec will never submit. No retry.
                    tracing::warn!(job_id = job.id, reason = %reason, "Submission rejected");
                    let update = JobUpdate::to(JobStatus::Failed)
                        .error(format!("Scheduler rejected submission: {reason}"));
                    self.store
                        .transition(job.id, JobStatus::Queued, update)
                        .await?;
                }
                Err(BridgeError::Unavailable(reason)) => {
                    let delay = self.backoff.record_failure(Instant::now());
                    tracing::warn!(
                        job_id = job.id,
                        reason = %reason,
                        backoff_secs = delay.as_secs(),
                        "Scheduler unavailable, pausing dispatch",
                    );
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff = SubmitBackoff::new(Duration::from_secs(1), Duration::from_secs(5));
        let now = Instant::now();
        assert_eq!(backoff.record_failure(now), Duration::from_secs(1));
        assert_eq!(backoff.record_failure(now), Duration::from_secs(2));
        assert_eq!(backoff.record_failure(now), Duration::from_secs(4));
        assert_eq!(backoff.record_failure(now), Duration::from_secs(5));
        assert_eq!(backoff.record_failure(now), Duration::from_secs(5));
    }

    #[test]
    fn backoff_blocks_until_deadline() {
        let mut backoff = SubmitBackoff::new(Duration::from_secs(10), Duration::from_secs(60));
        let now = Instant::now();
        assert!(!backoff.is_blocked(now));
        backoff.record_failure(now);
        assert!(backoff.is_blocked(now));
        assert!(!backoff.is_blocked(now + Duration::from_secs(10)));
    }

    #[test]
    fn reset_clears_gate_and_growth() {
        let mut backoff = SubmitBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
        let now = Instant::now();
        backoff.record_failure(now);
        backoff.record_failure(now);
        backoff.reset();
        assert!(!backoff.is_blocked(now));
        assert_eq!(backoff.record_failure(now), Duration::from_secs(1));
    }
}
