//! The `JobStore`: transactional mapping from job id to job record.
//!
//! Every mutation is durably committed before the call returns. State
//! changes go through [`JobStore::transition`], which carries an
//! optimistic status guard: the row is only updated when its current
//! status matches what the caller read, so duplicate or late events are
//! detected as [`CoreError::Conflict`] instead of silently overwriting.

use chrono::Utc;
use gridexec_core::error::CoreError;
use gridexec_core::spec::JobSpec;
use gridexec_core::types::{JobId, Timestamp};
use sqlx::types::Json;

use crate::models::job::Job;
use crate::models::status::JobStatus;
use crate::DbPool;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, owner, spec, status_id, external_handle, attempt, last_seq, \
    last_heartbeat, result, error, created_at, updated_at";

/// A single-transition mutation applied by [`JobStore::transition`].
///
/// Only the fields that are `Some` (or flagged for clearing) are
/// touched; `status` and `updated_at` are always written.
#[derive(Debug, Default)]
pub struct JobUpdate {
    status: Option<JobStatus>,
    external_handle: Option<String>,
    clear_external_handle: bool,
    attempt: Option<i64>,
    last_heartbeat: Option<Timestamp>,
    clear_last_heartbeat: bool,
    result: Option<serde_json::Value>,
    error: Option<String>,
    seq: Option<i64>,
}

impl JobUpdate {
    /// Start an update that moves the job to `status`.
    pub fn to(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Start an update that keeps the current status (heartbeat refresh).
    pub fn same_status() -> Self {
        Self::default()
    }

    pub fn external_handle(mut self, handle: impl Into<String>) -> Self {
        self.external_handle = Some(handle.into());
        self
    }

    pub fn clear_external_handle(mut self) -> Self {
        self.clear_external_handle = true;
        self
    }

    pub fn attempt(mut self, attempt: i64) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn heartbeat(mut self, at: Timestamp) -> Self {
        self.last_heartbeat = Some(at);
        self
    }

    pub fn clear_heartbeat(mut self) -> Self {
        self.clear_last_heartbeat = true;
        self
    }

    pub fn result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Record the wrapper sequence number that produced this transition.
    pub fn seq(mut self, seq: i64) -> Self {
        self.seq = Some(seq);
        self
    }
}

/// Durable job record store. Owns the connection pool; the daemon holds
/// exactly one instance.
#[derive(Clone)]
pub struct JobStore {
    pool: DbPool,
}

impl JobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Validate `spec` and insert a new `Queued` job.
    pub async fn create(&self, spec: &JobSpec, owner: &str) -> Result<Job, CoreError> {
        spec.validate()?;
        if owner.is_empty() {
            return Err(CoreError::Validation("Owner must not be empty".into()));
        }

        let now = Utc::now();
        let query = format!(
            "INSERT INTO jobs (owner, spec, status_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(owner)
            .bind(Json(spec))
            .bind(JobStatus::Queued.id())
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Fetch a job by id.
    pub async fn get(&self, id: JobId) -> Result<Job, CoreError> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(CoreError::NotFound(id))
    }

    /// Atomically verify the job is still in `expected` and apply `update`.
    ///
    /// The guard is part of the UPDATE's WHERE clause, so a status that
    /// moved between read and write affects zero rows and resolves to
    /// `Conflict` (or `NotFound` when the row never existed).
    pub async fn transition(
        &self,
        id: JobId,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<Job, CoreError> {
        let new_status = update.status.unwrap_or(expected);

        // Assemble the SET clause from the populated update fields.
        let mut sets: Vec<&str> = vec!["status_id = ?", "updated_at = ?"];
        if update.clear_external_handle {
            sets.push("external_handle = NULL");
        } else if update.external_handle.is_some() {
            sets.push("external_handle = ?");
        }
        if update.attempt.is_some() {
            sets.push("attempt = ?");
        }
        if update.clear_last_heartbeat {
            sets.push("last_heartbeat = NULL");
        } else if update.last_heartbeat.is_some() {
            sets.push("last_heartbeat = ?");
        }
        if update.result.is_some() {
            sets.push("result = ?");
        }
        if update.error.is_some() {
            sets.push("error = ?");
        }
        if update.seq.is_some() {
            sets.push("last_seq = ?");
        }

        let query = format!(
            "UPDATE jobs SET {} WHERE id = ? AND status_id = ? RETURNING {COLUMNS}",
            sets.join(", "),
        );

        let mut q = sqlx::query_as::<_, Job>(&query)
            .bind(new_status.id())
            .bind(Utc::now());
        if let Some(handle) = &update.external_handle {
            if !update.clear_external_handle {
                q = q.bind(handle);
            }
        }
        if let Some(attempt) = update.attempt {
            q = q.bind(attempt);
        }
        if let Some(hb) = update.last_heartbeat {
            if !update.clear_last_heartbeat {
                q = q.bind(hb);
            }
        }
        if let Some(result) = &update.result {
            q = q.bind(Json(result));
        }
        if let Some(error) = &update.error {
            q = q.bind(error);
        }
        if let Some(seq) = update.seq {
            q = q.bind(seq);
        }

        let updated = q
            .bind(id)
            .bind(expected.id())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match updated {
            Some(job) => Ok(job),
            // Zero rows: either the job is gone or its status moved.
            None => {
                let current = self.get(id).await?;
                Err(CoreError::Conflict {
                    id,
                    detail: format!(
                        "expected status {}, found {}",
                        expected,
                        current
                            .status()
                            .map(|s| s.name())
                            .unwrap_or("<corrupt>"),
                    ),
                })
            }
        }
    }

    /// Snapshot of all non-terminal jobs, in creation (dispatch) order.
    pub async fn list_active(&self) -> Result<Vec<Job>, CoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE status_id IN (?, ?, ?) ORDER BY id ASC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Queued.id())
            .bind(JobStatus::Dispatched.id())
            .bind(JobStatus::Running.id())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    /// All jobs submitted by `owner`, newest first.
    pub async fn list_by_owner(&self, owner: &str) -> Result<Vec<Job>, CoreError> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE owner = ? ORDER BY id DESC");
        sqlx::query_as::<_, Job>(&query)
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }
}

fn db_err(err: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("database error: {err}"))
}
