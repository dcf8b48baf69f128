//! Workload supervision: spawn the real command and summarise its exit.

use std::process::Stdio;
use std::time::Instant;

use tokio::process::{Child, Command};

/// How the supervised workload ended.
#[derive(Debug)]
pub enum Outcome {
    /// Exited with code 0.
    Success { exit_code: i32, duration_secs: u64 },
    /// Exited non-zero or was killed by a signal.
    Failure { detail: String },
}

/// A running workload command.
pub struct Workload {
    child: Child,
    started: Instant,
}

impl Workload {
    /// Spawn `argv` as the workload process.
    ///
    /// stdout/stderr stay inherited: the scheduler captures the slot's
    /// output files. `kill_on_drop` ties the child to the wrapper, so a
    /// dying wrapper never leaves the workload behind.
    pub fn spawn(argv: &[String]) -> std::io::Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| std::io::Error::other("Empty workload command"))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        tracing::info!(program = %program, args = args.len(), "Workload started");
        Ok(Self {
            child,
            started: Instant::now(),
        })
    }

    /// Wait for the workload to exit and summarise the result.
    pub async fn wait(&mut self) -> Outcome {
        let duration_secs = |started: Instant| started.elapsed().as_secs();
        match self.child.wait().await {
            Ok(status) => match status.code() {
                Some(0) => Outcome::Success {
                    exit_code: 0,
                    duration_secs: duration_secs(self.started),
                },
                Some(code) => Outcome::Failure {
                    detail: format!("Workload exited with code {code}"),
                },
                None => Outcome::Failure {
                    detail: "Workload killed by signal".into(),
                },
            },
            Err(e) => Outcome::Failure {
                detail: format!("Wait on workload failed: {e}"),
            },
        }
    }
}
