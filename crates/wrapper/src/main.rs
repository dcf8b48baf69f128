//! `gridexec-wrapper` -- job-slot supervisor.
//!
//! The external scheduler runs this binary in every job slot. It
//! reports `JobStarted`, supervises the real workload command (passed
//! as arguments), heartbeats while the workload runs, and delivers
//! exactly one terminal callback.
//!
//! # Environment variables
//!
//! | Variable                  | Required | Default | Description                              |
//! |---------------------------|----------|---------|------------------------------------------|
//! | `GRIDEXEC_JOB_ID`         | yes      | --      | Job id assigned by the daemon            |
//! | `GRIDEXEC_ATTEMPT`        | yes      | --      | Attempt counter for this dispatch        |
//! | `GRIDEXEC_DAEMON_URL`     | yes      | --      | Control endpoint, e.g. `ws://host:5555/control` |
//! | `GRIDEXEC_HANDLE`         | yes      | --      | Scheduler handle for this unit           |
//! | `GRIDEXEC_HEARTBEAT_SECS` | no       | `30`    | Seconds between heartbeats               |

use std::time::Duration;

use gridexec_proto::Request;
use gridexec_wrapper::reporter::{Delivery, Reporter};
use gridexec_wrapper::workload::{Outcome, Workload};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default interval between heartbeat callbacks.
const DEFAULT_HEARTBEAT_SECS: u64 = 30;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridexec_wrapper=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let job_id: i64 = required_env("GRIDEXEC_JOB_ID").parse().unwrap_or_else(|_| {
        tracing::error!("GRIDEXEC_JOB_ID must be a valid integer");
        std::process::exit(1);
    });
    let attempt: u32 = required_env("GRIDEXEC_ATTEMPT").parse().unwrap_or_else(|_| {
        tracing::error!("GRIDEXEC_ATTEMPT must be a valid integer");
        std::process::exit(1);
    });
    let daemon_url = required_env("GRIDEXEC_DAEMON_URL");
    let handle = required_env("GRIDEXEC_HANDLE");

    let heartbeat_secs: u64 = std::env::var("GRIDEXEC_HEARTBEAT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_HEARTBEAT_SECS);

    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() {
        tracing::error!("No workload command given");
        std::process::exit(1);
    }

    tracing::info!(
        job_id,
        attempt,
        handle = %handle,
        daemon_url = %daemon_url,
        "Starting gridexec-wrapper",
    );

    let mut reporter = Reporter::new(&daemon_url, job_id);

    match reporter
        .send_persistent(Request::JobStarted {
            external_handle: handle,
        })
        .await
    {
        Delivery::Accepted => {}
        // Refused means the daemon no longer wants this attempt
        // (cancelled, requeued elsewhere); do not run the workload.
        Delivery::Refused => {
            tracing::error!("Daemon refused JobStarted, not running the workload");
            std::process::exit(1);
        }
        Delivery::Undeliverable => {
            tracing::error!("Daemon unreachable, not running the workload");
            std::process::exit(1);
        }
    }

    let mut workload = match Workload::spawn(&argv) {
        Ok(workload) => workload,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start workload");
            reporter
                .send_persistent(Request::JobFailed {
                    error: format!("Failed to start workload: {e}"),
                })
                .await;
            std::process::exit(1);
        }
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(heartbeat_secs));
    // The first tick fires immediately; JobStarted just went out.
    ticker.tick().await;

    let outcome = loop {
        tokio::select! {
            outcome = workload.wait() => break outcome,
            _ = ticker.tick() => {
                tracing::debug!(job_id, "Heartbeat");
                if reporter.send(Request::JobHeartbeat).await == Delivery::Refused {
                    // The scheduler will remove this slot shortly; keep
                    // supervising until it does.
                    tracing::warn!(job_id, "Daemon refused heartbeat");
                }
            }
        }
    };

    let exit_code = match outcome {
        Outcome::Success {
            exit_code,
            duration_secs,
        } => {
            tracing::info!(job_id, duration_secs, "Workload completed");
            let result = serde_json::json!({
                "exit_code": exit_code,
                "duration_secs": duration_secs,
            });
            report_terminal(&mut reporter, Request::JobCompleted { result }).await;
            0
        }
        Outcome::Failure { detail } => {
            tracing::error!(job_id, detail = %detail, "Workload failed");
            report_terminal(&mut reporter, Request::JobFailed { error: detail }).await;
            1
        }
    };

    std::process::exit(exit_code);
}

/// Deliver the terminal callback, logging (but not masking the exit
/// code) when the daemon cannot be reached.
async fn report_terminal(reporter: &mut Reporter, body: Request) {
    match reporter.send_persistent(body).await {
        Delivery::Accepted => {}
        Delivery::Refused => {
            tracing::warn!("Daemon refused terminal callback");
        }
        Delivery::Undeliverable => {
            tracing::error!("Terminal callback undeliverable, daemon will reconcile");
        }
    }
}

fn required_env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| {
        tracing::error!("{name} environment variable is required");
        std::process::exit(1);
    })
}
