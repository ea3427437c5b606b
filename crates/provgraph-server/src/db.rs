//! PostgreSQL pool and schema setup for the manifest repository.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Manifest reads and writes are single-row statements; a small pool suffices.
pub const MAX_CONNECTIONS: u32 = 10;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
}

/// Applies `migrations/` (creates the `manifests` table).
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
