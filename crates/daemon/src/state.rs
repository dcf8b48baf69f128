use std::sync::Arc;

use crate::engine::EngineHandle;
use crate::ws::ConnectionRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: inner data is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (health checks only; mutations go
    /// through the engine).
    pub pool: gridexec_db::DbPool,
    /// Handle to the lifecycle engine actor.
    pub engine: EngineHandle,
    /// Registry of live control-protocol connections.
    pub registry: Arc<ConnectionRegistry>,
}
