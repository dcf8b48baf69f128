//! Envelope handling: client requests and sequenced wrapper callbacks.

use chrono::Utc;
use gridexec_core::error::CoreError;
use gridexec_core::spec::JobSpec;
use gridexec_core::types::JobId;
use gridexec_db::models::job::Job;
use gridexec_db::models::status::JobStatus;
use gridexec_db::JobUpdate;
use gridexec_proto::{Envelope, ErrorCode, Reply, Request};

use crate::engine::LifecycleEngine;
use crate::error::error_reply;

/// Owner recorded when a client does not identify itself.
const DEFAULT_OWNER: &str = "anonymous";

impl LifecycleEngine {
    /// Apply one protocol envelope and produce its reply.
    ///
    /// Never returns an error: every failure mode maps to a [`Reply`],
    /// so a bad message can degrade only itself.
    pub async fn handle_envelope(&mut self, envelope: Envelope) -> Reply {
        if let Err(e) = envelope.validate() {
            return Reply::Error {
                code: ErrorCode::Malformed,
                message: e.to_string(),
            };
        }

        let Envelope {
            job_id,
            sequence,
            body,
        } = envelope;

        match (job_id, sequence, body) {
            (_, _, Request::SubmitJob { spec, owner }) => self.submit_job(spec, owner).await,
            (Some(id), _, Request::CancelJob) => self.cancel_job(id).await,
            (Some(id), _, Request::QueryStatus) => self.query_status(id).await,
            (Some(id), Some(seq), callback) => self.apply_callback(id, seq, callback).await,
            // validate() rejects these shapes before we get here.
            _ => Reply::Error {
                code: ErrorCode::Malformed,
                message: "Missing job_id or sequence".into(),
            },
        }
    }

    async fn submit_job(&mut self, spec: JobSpec, owner: Option<String>) -> Reply {
        let owner = owner.unwrap_or_else(|| DEFAULT_OWNER.to_string());
        match self.store.create(&spec, &owner).await {
            Ok(job) => {
                tracing::info!(job_id = job.id, owner = %job.owner, name = %spec.name, "Job accepted");
                Reply::Submitted { id: job.id }
            }
            Err(e) => error_reply(e),
        }
    }

    /// Cancel moves the record first; the external remove is
    /// best-effort and, if it fails, the orphan pass picks it up.
    async fn cancel_job(&mut self, id: JobId) -> Reply {
        let job = match self.store.get(id).await {
            Ok(job) => job,
            Err(e) => return error_reply(e),
        };
        let Some(status) = job.status() else {
            return error_reply(CoreError::Internal(format!("Job {id} has a corrupt status")));
        };
        if status.is_terminal() {
            return error_reply(CoreError::AlreadyTerminal(id));
        }

        match self
            .store
            .transition(id, status, JobUpdate::to(JobStatus::Cancelled))
            .await
        {
            Ok(cancelled) => {
                if let Some(handle) = &cancelled.external_handle {
                    if let Err(e) = self.bridge.cancel(handle).await {
                        tracing::warn!(
                            job_id = id,
                            handle = %handle,
                            error = %e,
                            "External cancel failed, reconciliation will retry",
                        );
                    }
                }
                self.finished.remove(&id);
                tracing::info!(job_id = id, was = %status, "Job cancelled");
                Reply::Ok
            }
            Err(e) => error_reply(e),
        }
    }

    async fn query_status(&mut self, id: JobId) -> Reply {
        match self.store.get(id).await {
            Ok(job) => Reply::Status {
                status: job
                    .status()
                    .map(|s| s.name().to_string())
                    .unwrap_or_else(|| "<corrupt>".into()),
                attempt: job.attempt,
                result: job.result.map(|r| r.0),
                error: job.error,
            },
            Err(e) => error_reply(e),
        }
    }

    /// Apply one sequenced wrapper callback.
    ///
    /// Duplicates and out-of-order deliveries (sequence at or below the
    /// job's `last_seq`) are acked `Stale` without touching the record;
    /// so are callbacks that find the job in a state they cannot apply
    /// to, which happens when an earlier failure already requeued it.
    async fn apply_callback(&mut self, id: JobId, seq: i64, body: Request) -> Reply {
        let job = match self.store.get(id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(job_id = id, kind = body.kind(), error = %e, "Callback for unknown job");
                return error_reply(e);
            }
        };
        let Some(status) = job.status() else {
            return error_reply(CoreError::Internal(format!("Job {id} has a corrupt status")));
        };
        if status.is_terminal() {
            return error_reply(CoreError::AlreadyTerminal(id));
        }
        if seq <= job.last_seq {
            tracing::debug!(
                job_id = id,
                seq,
                last_seq = job.last_seq,
                kind = body.kind(),
                "Dropping stale wrapper delivery",
            );
            return Reply::Stale;
        }

        match body {
            Request::JobStarted { external_handle } => {
                self.job_started(&job, status, seq, external_handle).await
            }
            Request::JobHeartbeat => self.job_heartbeat(&job, status, seq).await,
            Request::JobCompleted { result } => self.job_completed(&job, status, seq, result).await,
            Request::JobFailed { error } => self.job_failed(&job, status, seq, &error).await,
            other => {
                tracing::error!(job_id = id, kind = other.kind(), "Non-callback routed as callback");
                Reply::Error {
                    code: ErrorCode::Internal,
                    message: "Internal routing error".into(),
                }
            }
        }
    }

    async fn job_started(&mut self, job: &Job, status: JobStatus, seq: i64, handle: String) -> Reply {
        if status != JobStatus::Dispatched {
            tracing::debug!(job_id = job.id, status = %status, "JobStarted outside Dispatched, dropped");
            return Reply::Stale;
        }
        let update = JobUpdate::to(JobStatus::Running)
            .external_handle(handle)
            .heartbeat(Utc::now())
            .seq(seq);
        match self.store.transition(job.id, status, update).await {
            Ok(_) => {
                tracing::info!(job_id = job.id, attempt = job.attempt, "Job running");
                Reply::Ok
            }
            Err(e) => error_reply(e),
        }
    }

    async fn job_heartbeat(&mut self, job: &Job, status: JobStatus, seq: i64) -> Reply {
        if status != JobStatus::Running {
            tracing::debug!(job_id = job.id, status = %status, "Heartbeat outside Running, dropped");
            return Reply::Stale;
        }
        let update = JobUpdate::same_status().heartbeat(Utc::now()).seq(seq);
        match self.store.transition(job.id, status, update).await {
            Ok(_) => Reply::Ok,
            Err(e) => error_reply(e),
        }
    }

    async fn job_completed(
        &mut self,
        job: &Job,
        status: JobStatus,
        seq: i64,
        result: serde_json::Value,
    ) -> Reply {
        // Completion may overtake JobStarted on a fresh connection, so
        // Dispatched is accepted too.
        if !matches!(status, JobStatus::Dispatched | JobStatus::Running) {
            tracing::debug!(job_id = job.id, status = %status, "JobCompleted outside flight, dropped");
            return Reply::Stale;
        }
        let update = JobUpdate::to(JobStatus::Completed).result(result).seq(seq);
        match self.store.transition(job.id, status, update).await {
            Ok(_) => {
                self.finished.remove(&job.id);
                tracing::info!(job_id = job.id, attempt = job.attempt, "Job completed");
                Reply::Ok
            }
            Err(e) => error_reply(e),
        }
    }

    async fn job_failed(&mut self, job: &Job, status: JobStatus, seq: i64, error: &str) -> Reply {
        if !matches!(status, JobStatus::Dispatched | JobStatus::Running) {
            tracing::debug!(job_id = job.id, status = %status, "JobFailed outside flight, dropped");
            return Reply::Stale;
        }
        let was_running = status == JobStatus::Running;
        match self
            .fail_or_requeue(job, status, error, was_running, Some(seq))
            .await
        {
            Ok(()) => Reply::Ok,
            Err(e) => error_reply(e),
        }
    }

    /// Shared failure path: requeue while the retry budget allows,
    /// otherwise mark Failed. A requeue resets `last_seq`; the next
    /// attempt's wrapper sequences from 1 again.
    pub(crate) async fn fail_or_requeue(
        &mut self,
        job: &Job,
        status: JobStatus,
        error: &str,
        was_running: bool,
        seq: Option<i64>,
    ) -> Result<(), CoreError> {
        self.finished.remove(&job.id);
        if self.config.retry.should_retry(job.attempt as u32, was_running) {
            let update = JobUpdate::to(JobStatus::Queued)
                .attempt(job.attempt + 1)
                .clear_external_handle()
                .clear_heartbeat()
                .seq(0);
            self.store.transition(job.id, status, update).await?;
            tracing::warn!(
                job_id = job.id,
                attempt = job.attempt + 1,
                error,
                "Job failed, requeued",
            );
        } else {
            let mut update = JobUpdate::to(JobStatus::Failed).error(error);
            if let Some(seq) = seq {
                update = update.seq(seq);
            }
            self.store.transition(job.id, status, update).await?;
            tracing::warn!(job_id = job.id, attempt = job.attempt, error, "Job failed permanently");
        }
        Ok(())
    }
}
