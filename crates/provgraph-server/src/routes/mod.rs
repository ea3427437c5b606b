//! API routes for the manifest server.

pub mod manifests;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::repository::ManifestRepository;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn ManifestRepository>,
}

/// Creates the main API router with all routes mounted.
pub fn create_router(repository: Arc<dyn ManifestRepository>) -> Router {
    let state = AppState { repository };
    Router::new()
        .nest("/api/v1", api_v1_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Creates the v1 API routes.
fn api_v1_routes(state: AppState) -> Router {
    Router::new().nest("/manifests", manifests::router(state))
}
