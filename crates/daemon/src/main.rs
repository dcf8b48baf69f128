use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use axum::routing::get;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridexec_condor::CondorBridge;
use gridexec_daemon::config::DaemonConfig;
use gridexec_daemon::engine::LifecycleEngine;
use gridexec_daemon::{routes, state, ws};
use gridexec_db::lock::StoreLock;
use gridexec_db::JobStore;

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = DaemonConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, db = %config.db_path.display(), "Loaded daemon configuration");

    // --- Job store ---
    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir).expect("Failed to create job store directory");
    }

    // Fail fast when another daemon owns the store.
    let _store_lock = StoreLock::acquire(&config.db_path).expect("Job store is already in use");

    let pool = gridexec_db::create_pool(&config.db_path)
        .await
        .expect("Failed to open job store");
    tracing::info!("Job store opened");

    gridexec_db::run_migrations(&pool)
        .await
        .expect("Failed to run job store migrations");
    tracing::info!("Job store migrations applied");

    gridexec_db::health_check(&pool)
        .await
        .expect("Job store health check failed");

    // --- Scheduler bridge ---
    let bridge = Arc::new(
        CondorBridge::new(config.callback_url.clone())
            .with_call_timeout(Duration::from_secs(config.condor_timeout_secs)),
    );

    // --- Lifecycle engine ---
    let store = JobStore::new(pool.clone());
    let mut engine = LifecycleEngine::new(store, bridge, config.engine_config());

    // Startup reconciliation runs before the endpoint accepts traffic,
    // so a job the scheduler already runs is never dispatched twice.
    // An unreachable scheduler is waited out here, not skipped.
    engine
        .reconcile_until_ready()
        .await
        .expect("Startup reconciliation failed");
    tracing::info!("Startup reconciliation complete");

    let (engine_handle, commands) = LifecycleEngine::channel();
    let engine_cancel = tokio_util::sync::CancellationToken::new();
    let engine_task = tokio::spawn(engine.run(commands, engine_cancel.clone()));

    // --- Connection registry ---
    let registry = Arc::new(ws::ConnectionRegistry::new());
    let keepalive_handle = ws::start_keepalive(Arc::clone(&registry));

    // --- App state ---
    let state = AppState {
        pool,
        engine: engine_handle,
        registry: Arc::clone(&registry),
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        .merge(routes::health::router())
        .route("/control", get(ws::control_handler))
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid GRIDEXEC_HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting control endpoint");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Control endpoint stopped, cleaning up");

    engine_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), engine_task).await;
    tracing::info!("Lifecycle engine stopped");

    let count = registry.connection_count().await;
    tracing::info!(count, "Closing remaining control connections");
    registry.shutdown_all().await;

    keepalive_handle.abort();
    tracing::info!("Graceful shutdown complete");
}

/// Initialise the tracing subscriber; `LOG_FORMAT=json` switches to
/// machine-readable output for log shippers.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gridexec_daemon=debug,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the daemon
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
