//! provgraph server - HTTP manifest store
//!
//! Serves `/api/v1/manifests` for the database storage backend. Manifests are
//! checked for a matching content address (and a valid signature when signed)
//! before they are stored; stored bodies are never modified.

pub mod db;
pub mod error;
pub mod models;
pub mod repository;
pub mod routes;

pub use error::AppError;
pub use repository::{ManifestRepository, MemoryRepository, PostgresRepository};
pub use routes::{create_router, AppState};
