//! Job entity model.

use gridexec_core::spec::JobSpec;
use gridexec_core::types::{JobId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: JobId,
    pub owner: String,
    pub spec: Json<JobSpec>,
    pub status_id: StatusId,
    /// Identifier assigned by the external scheduler; absent while `Queued`
    /// and for jobs cancelled before dispatch.
    pub external_handle: Option<String>,
    pub attempt: i64,
    /// Highest wrapper sequence number applied for this job.
    pub last_seq: i64,
    pub last_heartbeat: Option<Timestamp>,
    pub result: Option<Json<serde_json::Value>>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Decode the stored status discriminant.
    ///
    /// The store only ever writes [`JobStatus`] ids, so an unknown value
    /// means the file was tampered with; surfaced as `None` rather than
    /// a panic.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }
}
