//! Durable job store backed by SQLite via sqlx.
//!
//! The store file is exclusively owned by a single daemon process
//! ([`lock::StoreLock`]). WAL journaling keeps the file consistent for
//! external hot-backup tooling while the daemon is running.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub mod lock;
pub mod models;
pub mod store;

pub use store::{JobStore, JobUpdate};

pub type DbPool = sqlx::SqlitePool;

/// Open (creating if necessary) the job database at `path`.
///
/// A single connection is used: every mutation is serialized through the
/// lifecycle engine anyway, and one writer avoids SQLITE_BUSY churn.
pub async fn create_pool(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

/// In-memory pool for tests and dry runs. Schema still comes from
/// [`run_migrations`].
pub async fn create_memory_pool() -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

/// Apply pending schema migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Verify the database answers queries.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
