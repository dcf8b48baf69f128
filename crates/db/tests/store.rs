//! JobStore integration tests against in-memory SQLite.

use gridexec_core::error::CoreError;
use gridexec_core::spec::JobSpec;
use gridexec_db::models::JobStatus;
use gridexec_db::{JobStore, JobUpdate};

async fn store() -> JobStore {
    let pool = gridexec_db::create_memory_pool().await.unwrap();
    gridexec_db::run_migrations(&pool).await.unwrap();
    JobStore::new(pool)
}

fn spec(name: &str) -> JobSpec {
    JobSpec {
        name: name.into(),
        image: "ghcr.io/lab/task:1".into(),
        entrypoint: "run.sh".into(),
        args: vec![],
        cpus: 1,
        memory_mb: 512,
        disk_mb: 1024,
        requirements: None,
    }
}

#[tokio::test]
async fn create_inserts_queued_job() {
    let store = store().await;
    let job = store.create(&spec("alpha"), "alice").await.unwrap();

    assert_eq!(job.status(), Some(JobStatus::Queued));
    assert_eq!(job.owner, "alice");
    assert_eq!(job.attempt, 0);
    assert_eq!(job.last_seq, 0);
    assert!(job.external_handle.is_none());
    assert!(job.last_heartbeat.is_none());
    assert!(job.result.is_none());
}

#[tokio::test]
async fn create_rejects_invalid_spec() {
    let store = store().await;
    let mut bad = spec("beta");
    bad.image = String::new();

    let err = store.create(&bad, "alice").await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn ids_are_unique_and_increasing() {
    let store = store().await;
    let a = store.create(&spec("a"), "alice").await.unwrap();
    let b = store.create(&spec("b"), "alice").await.unwrap();
    assert!(b.id > a.id);
}

#[tokio::test]
async fn get_unknown_id_is_not_found() {
    let store = store().await;
    let err = store.get(4242).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(4242)));
}

#[tokio::test]
async fn transition_applies_mutation_once() {
    let store = store().await;
    let job = store.create(&spec("gamma"), "alice").await.unwrap();

    let dispatched = store
        .transition(
            job.id,
            JobStatus::Queued,
            JobUpdate::to(JobStatus::Dispatched).external_handle("1234.0"),
        )
        .await
        .unwrap();

    assert_eq!(dispatched.status(), Some(JobStatus::Dispatched));
    assert_eq!(dispatched.external_handle.as_deref(), Some("1234.0"));
    assert!(dispatched.updated_at >= job.updated_at);
}

#[tokio::test]
async fn stale_transition_is_conflict_and_leaves_record_unchanged() {
    let store = store().await;
    let job = store.create(&spec("delta"), "alice").await.unwrap();

    store
        .transition(
            job.id,
            JobStatus::Queued,
            JobUpdate::to(JobStatus::Cancelled),
        )
        .await
        .unwrap();

    // A late dispatch attempt still expects Queued.
    let err = store
        .transition(
            job.id,
            JobStatus::Queued,
            JobUpdate::to(JobStatus::Dispatched).external_handle("9.0"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict { .. }));

    let current = store.get(job.id).await.unwrap();
    assert_eq!(current.status(), Some(JobStatus::Cancelled));
    assert!(current.external_handle.is_none());
}

#[tokio::test]
async fn transition_on_missing_job_is_not_found() {
    let store = store().await;
    let err = store
        .transition(999, JobStatus::Queued, JobUpdate::to(JobStatus::Cancelled))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(999)));
}

#[tokio::test]
async fn requeue_clears_handle_and_heartbeat() {
    let store = store().await;
    let job = store.create(&spec("epsilon"), "alice").await.unwrap();

    store
        .transition(
            job.id,
            JobStatus::Queued,
            JobUpdate::to(JobStatus::Dispatched).external_handle("77.0"),
        )
        .await
        .unwrap();
    store
        .transition(
            job.id,
            JobStatus::Dispatched,
            JobUpdate::to(JobStatus::Running)
                .heartbeat(chrono::Utc::now())
                .seq(1),
        )
        .await
        .unwrap();

    let requeued = store
        .transition(
            job.id,
            JobStatus::Running,
            JobUpdate::to(JobStatus::Queued)
                .attempt(1)
                .clear_external_handle()
                .clear_heartbeat()
                .seq(0),
        )
        .await
        .unwrap();

    assert_eq!(requeued.status(), Some(JobStatus::Queued));
    assert_eq!(requeued.attempt, 1);
    assert!(requeued.external_handle.is_none());
    assert!(requeued.last_heartbeat.is_none());
    // The next attempt's wrapper sequences from 1 again.
    assert_eq!(requeued.last_seq, 0);
}

#[tokio::test]
async fn completed_job_keeps_result_and_handle() {
    let store = store().await;
    let job = store.create(&spec("zeta"), "bob").await.unwrap();

    store
        .transition(
            job.id,
            JobStatus::Queued,
            JobUpdate::to(JobStatus::Dispatched).external_handle("55.0"),
        )
        .await
        .unwrap();
    let done = store
        .transition(
            job.id,
            JobStatus::Dispatched,
            JobUpdate::to(JobStatus::Completed)
                .result(serde_json::json!({"exit_code": 0}))
                .seq(2),
        )
        .await
        .unwrap();

    assert_eq!(done.status(), Some(JobStatus::Completed));
    assert_eq!(done.external_handle.as_deref(), Some("55.0"));
    assert_eq!(done.result.as_ref().unwrap().0["exit_code"], 0);
}

#[tokio::test]
async fn list_active_returns_non_terminal_in_creation_order() {
    let store = store().await;
    let a = store.create(&spec("a"), "alice").await.unwrap();
    let b = store.create(&spec("b"), "bob").await.unwrap();
    let c = store.create(&spec("c"), "alice").await.unwrap();

    store
        .transition(b.id, JobStatus::Queued, JobUpdate::to(JobStatus::Cancelled))
        .await
        .unwrap();

    let active: Vec<_> = store
        .list_active()
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(active, vec![a.id, c.id]);
}

#[tokio::test]
async fn list_by_owner_filters() {
    let store = store().await;
    store.create(&spec("a"), "alice").await.unwrap();
    store.create(&spec("b"), "bob").await.unwrap();
    store.create(&spec("c"), "alice").await.unwrap();

    let mine = store.list_by_owner("alice").await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|j| j.owner == "alice"));
}

#[tokio::test]
async fn heartbeat_refresh_keeps_status() {
    let store = store().await;
    let job = store.create(&spec("eta"), "alice").await.unwrap();

    store
        .transition(
            job.id,
            JobStatus::Queued,
            JobUpdate::to(JobStatus::Dispatched).external_handle("3.0"),
        )
        .await
        .unwrap();
    store
        .transition(
            job.id,
            JobStatus::Dispatched,
            JobUpdate::to(JobStatus::Running)
                .heartbeat(chrono::Utc::now())
                .seq(1),
        )
        .await
        .unwrap();

    let later = chrono::Utc::now();
    let refreshed = store
        .transition(
            job.id,
            JobStatus::Running,
            JobUpdate::same_status().heartbeat(later).seq(2),
        )
        .await
        .unwrap();

    assert_eq!(refreshed.status(), Some(JobStatus::Running));
    assert_eq!(refreshed.last_seq, 2);
    assert!(refreshed.last_heartbeat.is_some());
}
