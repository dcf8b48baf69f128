//! Reconciliation between the job store and the external scheduler.
//!
//! Runs at startup (before the control endpoint accepts submissions)
//! and periodically. Each pass is idempotent: with no intervening
//! events a second pass observes nothing to do.

use std::collections::HashSet;
use std::time::Instant;

use gridexec_condor::ExternalStatus;
use gridexec_core::error::CoreError;
use gridexec_core::types::JobId;
use gridexec_db::models::job::Job;
use gridexec_db::models::status::JobStatus;

use crate::engine::LifecycleEngine;

impl LifecycleEngine {
    /// One reconciliation pass.
    ///
    /// Orphans (scheduler units no job refers to) are cancelled; jobs
    /// the scheduler no longer lists are re-queried and resolved:
    /// still queued/running is left alone, vanished is treated as a
    /// failure, finished without a terminal callback gets a grace
    /// window and is then failed implicitly. An unreachable scheduler
    /// is `BackendUnavailable`: the periodic tick skips the pass, the
    /// startup path retries until one pass completes.
    pub async fn reconcile(&mut self) -> Result<(), CoreError> {
        let external = self
            .bridge
            .list_active_handles()
            .await
            .map_err(|e| CoreError::BackendUnavailable(e.to_string()))?;
        let active = self.store.list_active().await?;

        let tracked: HashSet<&str> = active
            .iter()
            .filter_map(|job| job.external_handle.as_deref())
            .collect();

        for handle in external.iter().filter(|h| !tracked.contains(h.as_str())) {
            tracing::warn!(handle = %handle, "Cancelling orphaned scheduler unit");
            if let Err(e) = self.bridge.cancel(handle).await {
                tracing::warn!(handle = %handle, error = %e, "Orphan cancel failed, retrying next pass");
            }
        }

        for job in &active {
            let Some(status) = job.status() else {
                continue;
            };
            if status == JobStatus::Queued {
                continue;
            }
            let Some(handle) = job.external_handle.as_deref() else {
                continue;
            };
            if external.contains(handle) {
                self.finished.remove(&job.id);
                continue;
            }

            let ext_status = match self.bridge.query_status(handle).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(job_id = job.id, handle, error = %e, "Status query failed, deferring");
                    continue;
                }
            };
            match ext_status {
                // Raced the queue listing; trust the direct query.
                ExternalStatus::Pending | ExternalStatus::Running => {
                    self.finished.remove(&job.id);
                }
                ExternalStatus::Finished => self.note_finished(job, status).await?,
                ExternalStatus::Missing => {
                    tracing::warn!(job_id = job.id, handle, "External scheduler lost the job");
                    let was_running = status == JobStatus::Running;
                    self.fail_or_requeue(
                        job,
                        status,
                        "External scheduler lost the job",
                        was_running,
                        None,
                    )
                    .await?;
                }
            }
        }

        // Drop grace tracking for jobs that left the active set.
        let active_ids: HashSet<JobId> = active.iter().map(|job| job.id).collect();
        self.finished.retain(|id, _| active_ids.contains(id));
        Ok(())
    }

    /// Startup reconciliation. The control endpoint must not open until
    /// a pass has actually run, so an unreachable scheduler is retried
    /// with capped backoff instead of being skipped.
    pub async fn reconcile_until_ready(&mut self) -> Result<(), CoreError> {
        let mut delay = self.config.submit_backoff_initial;
        loop {
            match self.reconcile().await {
                Ok(()) => return Ok(()),
                Err(CoreError::BackendUnavailable(detail)) => {
                    tracing::warn!(
                        error = %detail,
                        retry_secs = delay.as_secs(),
                        "Scheduler unavailable, retrying startup reconciliation",
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2).min(self.config.submit_backoff_cap);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The unit left the scheduler queue; its wrapper gets
    /// `finished_grace` to deliver a terminal callback before the job
    /// is failed implicitly.
    async fn note_finished(&mut self, job: &Job, status: JobStatus) -> Result<(), CoreError> {
        let first_seen = *self.finished.entry(job.id).or_insert_with(Instant::now);
        if first_seen.elapsed() >= self.config.finished_grace {
            tracing::warn!(
                job_id = job.id,
                grace_secs = self.config.finished_grace.as_secs(),
                "No terminal callback after scheduler finish",
            );
            let was_running = status == JobStatus::Running;
            self.fail_or_requeue(
                job,
                status,
                "No terminal callback after scheduler finish",
                was_running,
                None,
            )
            .await?;
        }
        Ok(())
    }
}
