use gridexec_core::spec::JobSpec;
use gridexec_core::types::JobId;
use serde::{Deserialize, Serialize};

/// Structural errors detected before a message reaches the engine.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("{0} requires a job_id")]
    MissingJobId(&'static str),

    #[error("{0} requires a sequence number")]
    MissingSequence(&'static str),
}

/// Request body, tagged by `kind` with the variant data under `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Request {
    /// Client: enqueue a new job. `owner` is the submitting identity;
    /// the daemon falls back to a default when omitted.
    SubmitJob {
        spec: JobSpec,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
    },
    /// Client: cancel the addressed job.
    CancelJob,
    /// Client: read the addressed job's last-committed state.
    QueryStatus,
    /// Wrapper: the job slot started and discovered its external handle.
    JobStarted { external_handle: String },
    /// Wrapper: periodic liveness signal.
    JobHeartbeat,
    /// Wrapper: terminal success with an exit summary.
    JobCompleted { result: serde_json::Value },
    /// Wrapper: terminal failure.
    JobFailed { error: String },
}

impl Request {
    /// Wire name of this request kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::SubmitJob { .. } => "SubmitJob",
            Request::CancelJob => "CancelJob",
            Request::QueryStatus => "QueryStatus",
            Request::JobStarted { .. } => "JobStarted",
            Request::JobHeartbeat => "JobHeartbeat",
            Request::JobCompleted { .. } => "JobCompleted",
            Request::JobFailed { .. } => "JobFailed",
        }
    }

    /// Every kind except `SubmitJob` addresses an existing job.
    pub fn requires_job_id(&self) -> bool {
        !matches!(self, Request::SubmitJob { .. })
    }

    /// Whether this is a wrapper-originated callback (sequenced).
    pub fn is_wrapper_callback(&self) -> bool {
        matches!(
            self,
            Request::JobStarted { .. }
                | Request::JobHeartbeat
                | Request::JobCompleted { .. }
                | Request::JobFailed { .. }
        )
    }
}

/// A request envelope as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    #[serde(flatten)]
    pub body: Request,
}

impl Envelope {
    /// Build a client request (no sequence number).
    pub fn request(job_id: Option<JobId>, body: Request) -> Self {
        Self {
            job_id,
            sequence: None,
            body,
        }
    }

    /// Build a sequenced wrapper callback.
    pub fn callback(job_id: JobId, sequence: i64, body: Request) -> Self {
        Self {
            job_id: Some(job_id),
            sequence: Some(sequence),
            body,
        }
    }

    /// Structural validation: job-addressed kinds need a `job_id`,
    /// wrapper callbacks additionally need a `sequence`.
    pub fn validate(&self) -> Result<(), ProtoError> {
        if self.body.requires_job_id() && self.job_id.is_none() {
            return Err(ProtoError::MissingJobId(self.body.kind()));
        }
        if self.body.is_wrapper_callback() && self.sequence.is_none() {
            return Err(ProtoError::MissingSequence(self.body.kind()));
        }
        Ok(())
    }
}

/// Reply envelope, same tagging scheme as [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Reply {
    /// `SubmitJob` accepted; the new job id.
    Submitted { id: JobId },
    /// Request applied.
    Ok,
    /// Duplicate or out-of-order delivery; acknowledged as a no-op.
    Stale,
    /// Last-committed view of a job.
    Status {
        status: String,
        attempt: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Request failed; `code` is machine-readable.
    Error { code: ErrorCode, message: String },
}

/// Machine-readable error codes carried by [`Reply::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    AlreadyTerminal,
    BackendUnavailable,
    Malformed,
    Internal,
}

/// Parse an inbound text frame into an [`Envelope`].
///
/// Returns `Err` for malformed JSON or unknown `kind` values. Callers
/// reply `MALFORMED` and keep the connection alive.
pub fn parse_envelope(text: &str) -> Result<Envelope, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_submit_job() {
        let json = r#"{"kind":"SubmitJob","payload":{"spec":{
            "name":"fit","image":"ghcr.io/lab/fit:1","entrypoint":"run.sh",
            "cpus":2,"memory_mb":1024,"disk_mb":2048}}}"#;
        let env = parse_envelope(json).unwrap();
        assert!(env.job_id.is_none());
        match &env.body {
            Request::SubmitJob { spec, owner } => {
                assert_eq!(spec.name, "fit");
                assert!(owner.is_none());
            }
            other => panic!("Expected SubmitJob, got {other:?}"),
        }
        assert!(env.validate().is_ok());
    }

    #[test]
    fn parse_cancel_job() {
        let json = r#"{"kind":"CancelJob","job_id":7}"#;
        let env = parse_envelope(json).unwrap();
        assert_eq!(env.job_id, Some(7));
        assert!(matches!(env.body, Request::CancelJob));
        assert!(env.validate().is_ok());
    }

    #[test]
    fn parse_job_started_callback() {
        let json =
            r#"{"kind":"JobStarted","job_id":3,"sequence":1,"payload":{"external_handle":"812.0"}}"#;
        let env = parse_envelope(json).unwrap();
        assert_eq!(env.sequence, Some(1));
        match env.body {
            Request::JobStarted { external_handle } => assert_eq!(external_handle, "812.0"),
            other => panic!("Expected JobStarted, got {other:?}"),
        }
    }

    #[test]
    fn cancel_without_job_id_fails_validation() {
        let env = parse_envelope(r#"{"kind":"CancelJob"}"#).unwrap();
        assert!(matches!(
            env.validate(),
            Err(ProtoError::MissingJobId("CancelJob"))
        ));
    }

    #[test]
    fn heartbeat_without_sequence_fails_validation() {
        let env = parse_envelope(r#"{"kind":"JobHeartbeat","job_id":5}"#).unwrap();
        assert!(matches!(
            env.validate(),
            Err(ProtoError::MissingSequence("JobHeartbeat"))
        ));
    }

    #[test]
    fn unknown_kind_is_parse_error() {
        assert!(parse_envelope(r#"{"kind":"Nonsense","job_id":1}"#).is_err());
    }

    #[test]
    fn invalid_json_is_parse_error() {
        assert!(parse_envelope("definitely not json").is_err());
    }

    #[test]
    fn reply_error_code_wire_format() {
        let reply = Reply::Error {
            code: ErrorCode::AlreadyTerminal,
            message: "Job 9 already reached a terminal state".into(),
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("ALREADY_TERMINAL"));
    }

    #[test]
    fn status_reply_roundtrip() {
        let reply = Reply::Status {
            status: "Completed".into(),
            attempt: 1,
            result: Some(serde_json::json!({"exit_code": 0})),
            error: None,
        };
        let json = serde_json::to_string(&reply).unwrap();
        let back: Reply = serde_json::from_str(&json).unwrap();
        match back {
            Reply::Status { status, result, .. } => {
                assert_eq!(status, "Completed");
                assert_eq!(result.unwrap()["exit_code"], 0);
            }
            other => panic!("Expected Status, got {other:?}"),
        }
    }

    #[test]
    fn envelope_roundtrip_keeps_sequence() {
        let env = Envelope::callback(11, 4, Request::JobHeartbeat);
        let json = serde_json::to_string(&env).unwrap();
        let back = parse_envelope(&json).unwrap();
        assert_eq!(back.job_id, Some(11));
        assert_eq!(back.sequence, Some(4));
        assert!(matches!(back.body, Request::JobHeartbeat));
    }
}
