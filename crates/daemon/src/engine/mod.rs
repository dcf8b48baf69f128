//! The lifecycle engine: the single writer over the job store.
//!
//! Every mutation — client requests, wrapper callbacks, dispatch,
//! reconciliation, heartbeat sweeps — flows through one actor task, so
//! no two transitions ever interleave. Callers talk to the actor
//! through [`EngineHandle`], which pairs each command with a oneshot
//! reply channel.

mod dispatcher;
mod lifecycle;
mod reconciler;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gridexec_condor::SchedulerBridge;
use gridexec_core::error::CoreError;
use gridexec_core::policy::RetryPolicy;
use gridexec_core::types::JobId;
use gridexec_db::models::status::JobStatus;
use gridexec_db::JobStore;
use gridexec_proto::{Envelope, ErrorCode, Reply};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

pub use dispatcher::SubmitBackoff;

/// Depth of the engine's command queue. Senders block (briefly) when
/// the actor falls behind rather than growing an unbounded backlog.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Tunables for the engine's periodic work and failure handling.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    /// A Running job silent for longer than this is presumed dead.
    pub heartbeat_timeout: Duration,
    /// Window after a scheduler-side finish in which the wrapper's
    /// terminal callback must arrive.
    pub finished_grace: Duration,
    pub submit_backoff_initial: Duration,
    pub submit_backoff_cap: Duration,
    pub dispatch_interval: Duration,
    pub reconcile_interval: Duration,
    pub heartbeat_sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            heartbeat_timeout: Duration::from_secs(120),
            finished_grace: Duration::from_secs(60),
            submit_backoff_initial: Duration::from_secs(1),
            submit_backoff_cap: Duration::from_secs(300),
            dispatch_interval: Duration::from_secs(1),
            reconcile_interval: Duration::from_secs(60),
            heartbeat_sweep_interval: Duration::from_secs(30),
        }
    }
}

/// A command sent to the engine actor.
pub enum Command {
    /// A protocol envelope from a client or wrapper connection.
    Request {
        envelope: Envelope,
        reply: oneshot::Sender<Reply>,
    },
}

/// Cheap handle for submitting envelopes to the engine actor.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Submit an envelope and wait for the engine's reply.
    pub async fn request(&self, envelope: Envelope) -> Reply {
        let (tx, rx) = oneshot::channel();
        let cmd = Command::Request {
            envelope,
            reply: tx,
        };
        if self.tx.send(cmd).await.is_err() {
            return Reply::Error {
                code: ErrorCode::Internal,
                message: "Engine is shutting down".into(),
            };
        }
        match rx.await {
            Ok(reply) => reply,
            Err(_) => Reply::Error {
                code: ErrorCode::Internal,
                message: "Engine dropped the request".into(),
            },
        }
    }
}

/// The job lifecycle state machine, driving the store and the bridge.
pub struct LifecycleEngine {
    store: JobStore,
    bridge: Arc<dyn SchedulerBridge>,
    config: EngineConfig,
    backoff: SubmitBackoff,
    /// Jobs the scheduler reports finished, by when that was first
    /// observed. In-memory only: a restart just restarts the grace
    /// window.
    finished: HashMap<JobId, Instant>,
}

impl LifecycleEngine {
    pub fn new(store: JobStore, bridge: Arc<dyn SchedulerBridge>, config: EngineConfig) -> Self {
        let backoff = SubmitBackoff::new(config.submit_backoff_initial, config.submit_backoff_cap);
        Self {
            store,
            bridge,
            config,
            backoff,
            finished: HashMap::new(),
        }
    }

    /// Create the command channel the actor consumes.
    pub fn channel() -> (EngineHandle, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        (EngineHandle { tx }, rx)
    }

    /// Run the actor loop until the cancellation token fires.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
        let mut dispatch = tokio::time::interval(self.config.dispatch_interval);
        let mut reconcile = tokio::time::interval(self.config.reconcile_interval);
        let mut sweep = tokio::time::interval(self.config.heartbeat_sweep_interval);

        tracing::info!(
            dispatch_ms = self.config.dispatch_interval.as_millis() as u64,
            reconcile_ms = self.config.reconcile_interval.as_millis() as u64,
            "Lifecycle engine started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Lifecycle engine shutting down");
                    break;
                }
                Some(cmd) = commands.recv() => {
                    let Command::Request { envelope, reply } = cmd;
                    let response = self.handle_envelope(envelope).await;
                    let _ = reply.send(response);
                }
                _ = dispatch.tick() => {
                    if let Err(e) = self.dispatch_pass().await {
                        tracing::error!(error = %e, "Dispatch pass failed");
                    }
                }
                _ = sweep.tick() => {
                    if let Err(e) = self.sweep_heartbeats().await {
                        tracing::error!(error = %e, "Heartbeat sweep failed");
                    }
                }
                _ = reconcile.tick() => {
                    match self.reconcile().await {
                        Ok(()) => {}
                        Err(CoreError::BackendUnavailable(detail)) => {
                            tracing::warn!(error = %detail, "Reconciliation skipped, scheduler unavailable");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Reconciliation pass failed");
                        }
                    }
                }
            }
        }
    }

    /// Fail every Running job whose wrapper has gone silent.
    pub async fn sweep_heartbeats(&mut self) -> Result<(), CoreError> {
        let now = Utc::now();
        for job in self.store.list_active().await? {
            if job.status() != Some(JobStatus::Running) {
                continue;
            }
            let Some(heartbeat) = job.last_heartbeat else {
                continue;
            };
            let silent = (now - heartbeat).to_std().unwrap_or_default();
            if silent >= self.config.heartbeat_timeout {
                tracing::warn!(
                    job_id = job.id,
                    silent_secs = silent.as_secs(),
                    "Heartbeat timeout",
                );
                self.fail_or_requeue(
                    &job,
                    JobStatus::Running,
                    "Heartbeat timeout, wrapper presumed dead",
                    true,
                    None,
                )
                .await?;
            }
        }
        Ok(())
    }
}
