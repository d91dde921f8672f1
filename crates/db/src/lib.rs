//! Storage backends for sqlcheck.
//!
//! PostgreSQL serves three capabilities from one database:
//! [`PgRepository`] (job/task state), [`PgLockProvider`] (TTL locks),
//! and [`PgQueueBus`] (durable at-least-once event bus). The
//! [`MemoryRepository`] is the embedded/test backend honoring the same
//! guarded-transition contracts.

pub mod memory;
pub mod models;
pub mod pg;
pub mod repositories;

pub use memory::MemoryRepository;
pub use pg::{PgLockProvider, PgQueueBus, PgRepository};

/// Convenience alias used across the workspace.
pub type DbPool = sqlx::PgPool;

/// Maximum connections for the default pool.
const MAX_CONNECTIONS: u32 = 10;

/// Create a connection pool for the given database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await
}

/// Cheap connectivity probe.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
