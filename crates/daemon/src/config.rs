use std::path::PathBuf;
use std::time::Duration;

use gridexec_core::policy::RetryPolicy;

use crate::engine::EngineConfig;

/// Daemon configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single-user deployment next
/// to an HTCondor schedd. Override via environment variables.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5555`).
    pub port: u16,
    /// Path of the SQLite job store.
    pub db_path: PathBuf,
    /// URL wrappers dial back to; injected into the job environment.
    pub callback_url: String,
    /// Seconds between dispatch passes over the Queued backlog.
    pub dispatch_interval_secs: u64,
    /// Seconds between reconciliation passes against the scheduler.
    pub reconcile_interval_secs: u64,
    /// A Running job with no heartbeat for this long is presumed dead.
    pub heartbeat_timeout_secs: u64,
    /// Seconds between heartbeat-timeout sweeps.
    pub heartbeat_sweep_interval_secs: u64,
    /// How long a scheduler-Finished job may go without a terminal
    /// callback before it is failed implicitly.
    pub finished_grace_secs: u64,
    /// Retry budget for failures before the job ever ran.
    pub max_attempts: u32,
    /// Retry budget for failures after the job reached Running.
    pub running_max_attempts: u32,
    /// Cap on the exponential backoff applied when the scheduler is
    /// unreachable at submit time.
    pub submit_backoff_cap_secs: u64,
    /// Timeout for a single condor CLI call.
    pub condor_timeout_secs: u64,
}

impl DaemonConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                         |
    /// |---------------------------------|---------------------------------|
    /// | `GRIDEXEC_HOST`                 | `0.0.0.0`                       |
    /// | `GRIDEXEC_PORT`                 | `5555`                          |
    /// | `GRIDEXEC_DB_PATH`              | `~/.local/var/gridexec/jobs.db` |
    /// | `GRIDEXEC_CALLBACK_URL`         | `ws://127.0.0.1:{port}/control` |
    /// | `DISPATCH_INTERVAL_SECS`        | `1`                             |
    /// | `RECONCILE_INTERVAL_SECS`       | `60`                            |
    /// | `HEARTBEAT_TIMEOUT_SECS`        | `120`                           |
    /// | `HEARTBEAT_SWEEP_INTERVAL_SECS` | `30`                            |
    /// | `FINISHED_GRACE_SECS`           | `60`                            |
    /// | `MAX_ATTEMPTS`                  | `2`                             |
    /// | `RUNNING_MAX_ATTEMPTS`          | `1`                             |
    /// | `SUBMIT_BACKOFF_CAP_SECS`       | `300`                           |
    /// | `CONDOR_TIMEOUT_SECS`           | `30`                            |
    pub fn from_env() -> Self {
        let host = std::env::var("GRIDEXEC_HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("GRIDEXEC_PORT")
            .unwrap_or_else(|_| "5555".into())
            .parse()
            .expect("GRIDEXEC_PORT must be a valid u16");

        let db_path = std::env::var("GRIDEXEC_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_db_path());

        let callback_url = std::env::var("GRIDEXEC_CALLBACK_URL")
            .unwrap_or_else(|_| format!("ws://127.0.0.1:{port}/control"));

        Self {
            host,
            port,
            db_path,
            callback_url,
            dispatch_interval_secs: env_u64("DISPATCH_INTERVAL_SECS", 1),
            reconcile_interval_secs: env_u64("RECONCILE_INTERVAL_SECS", 60),
            heartbeat_timeout_secs: env_u64("HEARTBEAT_TIMEOUT_SECS", 120),
            heartbeat_sweep_interval_secs: env_u64("HEARTBEAT_SWEEP_INTERVAL_SECS", 30),
            finished_grace_secs: env_u64("FINISHED_GRACE_SECS", 60),
            max_attempts: env_u64("MAX_ATTEMPTS", 2) as u32,
            running_max_attempts: env_u64("RUNNING_MAX_ATTEMPTS", 1) as u32,
            submit_backoff_cap_secs: env_u64("SUBMIT_BACKOFF_CAP_SECS", 300),
            condor_timeout_secs: env_u64("CONDOR_TIMEOUT_SECS", 30),
        }
    }

    /// Derive the engine's tunables from the daemon-level config.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                running_max_attempts: self.running_max_attempts,
            },
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
            finished_grace: Duration::from_secs(self.finished_grace_secs),
            submit_backoff_initial: Duration::from_secs(1),
            submit_backoff_cap: Duration::from_secs(self.submit_backoff_cap_secs),
            dispatch_interval: Duration::from_secs(self.dispatch_interval_secs),
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs),
            heartbeat_sweep_interval: Duration::from_secs(self.heartbeat_sweep_interval_secs),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a valid u64"))
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".local/var/gridexec/jobs.db")
}
