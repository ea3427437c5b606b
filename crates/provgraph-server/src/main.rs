// provgraph-server entry point
//
// DATABASE_URL selects PostgreSQL; without it the server keeps manifests in
// memory. PROVGRAPH_BIND sets the listen address.

use std::sync::Arc;

use anyhow::Context;
use provgraph_server::{create_router, db, ManifestRepository, MemoryRepository, PostgresRepository};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();

    let repository: Arc<dyn ManifestRepository> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = db::create_pool(&url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Using PostgreSQL manifest repository");
            Arc::new(PostgresRepository::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; manifests are kept in memory and lost on exit");
            Arc::new(MemoryRepository::new())
        }
    };

    let bind = std::env::var("PROVGRAPH_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!(address = %bind, "Manifest server listening");

    axum::serve(listener, create_router(repository))
        .await
        .context("Server error")?;
    Ok(())
}
