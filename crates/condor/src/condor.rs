//! HTCondor CLI implementation of [`SchedulerBridge`].
//!
//! Shells out to `condor_submit` / `condor_q` / `condor_rm` /
//! `condor_history` with piped I/O and a hard timeout per call. A call
//! that cannot spawn or times out maps to [`BridgeError::Unavailable`];
//! a submit that the schedd itself refuses maps to
//! [`BridgeError::Rejected`] unless the stderr looks like a transport
//! failure.

use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use gridexec_core::spec::JobSpec;
use gridexec_core::types::JobId;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::submit_file::render_submit_description;
use crate::{BridgeError, ExternalHandle, ExternalStatus, SchedulerBridge};

/// Default timeout for a single scheduler CLI call.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// stderr fragments that indicate the schedd was unreachable rather
/// than the spec being bad.
const TRANSIENT_MARKERS: [&str; 4] = [
    "Failed to connect",
    "CEDAR",
    "Can't find address",
    "communication error",
];

/// Scheduler bridge backed by the HTCondor command-line tools.
pub struct CondorBridge {
    /// Callback URL handed to wrappers via the job environment.
    daemon_url: String,
    call_timeout: Duration,
}

impl CondorBridge {
    pub fn new(daemon_url: impl Into<String>) -> Self {
        Self {
            daemon_url: daemon_url.into(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Run a condor CLI tool, optionally feeding `stdin_data`, and
    /// capture its output. Spawn failure and timeout are `Unavailable`.
    async fn run_tool(
        &self,
        program: &str,
        args: &[&str],
        stdin_data: Option<&str>,
    ) -> Result<ToolOutput, BridgeError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::Unavailable(format!("failed to spawn {program}: {e}")))?;

        if let Some(data) = stdin_data {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(data.as_bytes()).await;
                drop(stdin);
            }
        }

        let output = tokio::time::timeout(self.call_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                BridgeError::Unavailable(format!(
                    "{program} timed out after {}s",
                    self.call_timeout.as_secs()
                ))
            })?
            .map_err(|e| BridgeError::Unavailable(format!("{program} I/O error: {e}")))?;

        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

struct ToolOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

#[async_trait]
impl SchedulerBridge for CondorBridge {
    async fn submit(
        &self,
        job_id: JobId,
        spec: &JobSpec,
        attempt: u32,
    ) -> Result<ExternalHandle, BridgeError> {
        let description = render_submit_description(spec, job_id, attempt, &self.daemon_url);
        let out = self
            .run_tool("condor_submit", &["-"], Some(&description))
            .await?;

        if !out.success {
            return Err(classify_submit_failure(&out.stderr));
        }

        let handle = parse_submit_output(&out.stdout).ok_or_else(|| {
            BridgeError::Unavailable(format!(
                "could not parse condor_submit output: {}",
                out.stdout.trim()
            ))
        })?;

        tracing::info!(job_id, handle = %handle, attempt, "Submitted job to condor");
        Ok(handle)
    }

    async fn cancel(&self, handle: &str) -> Result<(), BridgeError> {
        let out = self.run_tool("condor_rm", &[handle], None).await?;
        if !out.success {
            // Already gone counts as cancelled.
            tracing::warn!(handle, stderr = %out.stderr.trim(), "condor_rm reported failure");
        }
        Ok(())
    }

    async fn query_status(&self, handle: &str) -> Result<ExternalStatus, BridgeError> {
        let out = self
            .run_tool(
                "condor_q",
                &["-json", "-attributes", "ClusterId,JobStatus", handle],
                None,
            )
            .await?;
        if !out.success {
            return Err(BridgeError::Unavailable(format!(
                "condor_q failed: {}",
                out.stderr.trim()
            )));
        }

        if let Some(status) = first_job_status(&out.stdout) {
            return Ok(map_condor_status(status));
        }

        // Not in the queue: finished normally, or unknown entirely.
        let hist = self
            .run_tool(
                "condor_history",
                &["-limit", "1", "-json", "-attributes", "ClusterId", handle],
                None,
            )
            .await?;
        if hist.success && first_cluster_id(&hist.stdout).is_some() {
            Ok(ExternalStatus::Finished)
        } else {
            Ok(ExternalStatus::Missing)
        }
    }

    async fn list_active_handles(&self) -> Result<HashSet<ExternalHandle>, BridgeError> {
        // Only units carrying our submit-time tag; the orphan sweep
        // must never see jobs submitted outside gridexec. Removed (3)
        // and Completed (4) entries linger in the queue after their
        // store row is already terminal, so they are excluded as well.
        let out = self
            .run_tool(
                "condor_q",
                &[
                    "-json",
                    "-attributes",
                    "ClusterId",
                    "-constraint",
                    "GridexecManaged =?= True && JobStatus =!= 3 && JobStatus =!= 4",
                ],
                None,
            )
            .await?;
        if !out.success {
            return Err(BridgeError::Unavailable(format!(
                "condor_q failed: {}",
                out.stderr.trim()
            )));
        }
        Ok(parse_cluster_ids(&out.stdout)
            .into_iter()
            .map(|id| id.to_string())
            .collect())
    }
}

/// One classad as printed by `condor_q -json`.
#[derive(Debug, Deserialize)]
struct QueueAd {
    #[serde(rename = "ClusterId")]
    cluster_id: i64,
    #[serde(rename = "JobStatus", default)]
    job_status: Option<i64>,
}

/// Extract the cluster id from `condor_submit` output, e.g.
/// `1 job(s) submitted to cluster 8231.`
fn parse_submit_output(stdout: &str) -> Option<ExternalHandle> {
    let idx = stdout.find("submitted to cluster ")?;
    let rest = &stdout[idx + "submitted to cluster ".len()..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Decide whether a failed submit was transient or a spec rejection.
fn classify_submit_failure(stderr: &str) -> BridgeError {
    if TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m)) {
        BridgeError::Unavailable(stderr.trim().to_string())
    } else {
        BridgeError::Rejected(stderr.trim().to_string())
    }
}

/// Map HTCondor numeric JobStatus codes onto [`ExternalStatus`].
///
/// 1 = Idle, 2 = Running, 3 = Removed, 4 = Completed, 5 = Held,
/// 6 = Transferring output, 7 = Suspended.
fn map_condor_status(code: i64) -> ExternalStatus {
    match code {
        1 | 5 | 7 => ExternalStatus::Pending,
        2 | 6 => ExternalStatus::Running,
        4 => ExternalStatus::Finished,
        _ => ExternalStatus::Missing,
    }
}

fn parse_queue_ads(stdout: &str) -> Vec<QueueAd> {
    // condor_q -json prints an empty string (not `[]`) when nothing matches.
    if stdout.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(stdout).unwrap_or_default()
}

fn first_job_status(stdout: &str) -> Option<i64> {
    parse_queue_ads(stdout).first().and_then(|ad| ad.job_status)
}

fn first_cluster_id(stdout: &str) -> Option<i64> {
    parse_queue_ads(stdout).first().map(|ad| ad.cluster_id)
}

fn parse_cluster_ids(stdout: &str) -> Vec<i64> {
    parse_queue_ads(stdout)
        .into_iter()
        .map(|ad| ad.cluster_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_submit_output_extracts_cluster() {
        let stdout = "Submitting job(s).\n1 job(s) submitted to cluster 8231.\n";
        assert_eq!(parse_submit_output(stdout).as_deref(), Some("8231"));
    }

    #[test]
    fn parse_submit_output_garbage_is_none() {
        assert!(parse_submit_output("no clusters here").is_none());
        assert!(parse_submit_output("submitted to cluster x").is_none());
    }

    #[test]
    fn transient_submit_failure_is_unavailable() {
        let err = classify_submit_failure("ERROR: Failed to connect to local queue manager");
        assert!(matches!(err, BridgeError::Unavailable(_)));
    }

    #[test]
    fn spec_submit_failure_is_rejected() {
        let err = classify_submit_failure("ERROR: on line 3: unknown command");
        assert!(matches!(err, BridgeError::Rejected(_)));
    }

    #[test]
    fn condor_status_codes_map() {
        assert_eq!(map_condor_status(1), ExternalStatus::Pending);
        assert_eq!(map_condor_status(5), ExternalStatus::Pending);
        assert_eq!(map_condor_status(2), ExternalStatus::Running);
        assert_eq!(map_condor_status(6), ExternalStatus::Running);
        assert_eq!(map_condor_status(4), ExternalStatus::Finished);
        assert_eq!(map_condor_status(3), ExternalStatus::Missing);
    }

    #[test]
    fn queue_json_parses() {
        let stdout = r#"[{"ClusterId": 8231, "JobStatus": 2}, {"ClusterId": 8232, "JobStatus": 1}]"#;
        assert_eq!(first_job_status(stdout), Some(2));
        assert_eq!(parse_cluster_ids(stdout), vec![8231, 8232]);
    }

    #[test]
    fn empty_queue_output_parses_to_nothing() {
        assert!(parse_queue_ads("").is_empty());
        assert!(parse_queue_ads("\n").is_empty());
        assert_eq!(first_job_status(""), None);
    }
}
