//! Manifest store endpoints.
//!
//! `PUT /{id}` stores, `GET /{id}` returns the stored canonical bytes, `HEAD /{id}`
//! checks existence and `GET /?kind=` lists ids. Stored bodies are never
//! replaced: a second `PUT` of the same id succeeds without writing.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use provgraph_core::{claim_bytes, Manifest, ManifestId, ManifestKind};
use provgraph_crypto::{jcs_canonical_bytes, verify_declared};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use crate::error::AppError;
use crate::models::NewManifestRecord;

/// Response for a successful store.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutManifestResponse {
    pub id: String,
    /// False when the manifest was already stored
    pub created: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListManifestsResponse {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub kind: Option<String>,
}

/// Creates the manifests router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_manifests))
        .route("/{id}", get(get_manifest).put(put_manifest))
        .with_state(state)
}

/// PUT /api/v1/manifests/{id}
async fn put_manifest(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<PutManifestResponse>), AppError> {
    let path_id = parse_id(&id)?;
    let manifest = check_manifest(&body)?;

    if manifest.id != path_id {
        return Err(AppError::Conflict(format!(
            "Body carries id {} but was sent to {}",
            manifest.id, path_id
        )));
    }

    let canonical = jcs_canonical_bytes(&manifest)
        .map_err(|e| AppError::Internal(format!("Failed to canonicalize manifest: {}", e)))?;
    let body = String::from_utf8(canonical)
        .map_err(|e| AppError::Internal(format!("Canonical JSON is not UTF-8: {}", e)))?;

    let record = NewManifestRecord {
        id: manifest.id.to_string(),
        kind: manifest.kind().as_str().to_string(),
        body,
        created_at: manifest.claim.created_at,
    };
    let created = state.repository.insert(&record).await?;

    info!(id = %manifest.id, kind = %record.kind, created, "Stored manifest");

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(PutManifestResponse {
            id: record.id,
            created,
        }),
    ))
}

/// GET (and HEAD) /api/v1/manifests/{id}
async fn get_manifest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let record = state
        .repository
        .fetch(id.as_str())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Manifest {} not found", id)))?;

    Ok(([(header::CONTENT_TYPE, "application/json")], record.body).into_response())
}

/// GET /api/v1/manifests?kind=
async fn list_manifests(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListManifestsResponse>, AppError> {
    let kind = query
        .kind
        .as_deref()
        .map(|k| k.parse::<ManifestKind>())
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let ids = state.repository.list_ids(kind.map(|k| k.as_str())).await?;
    Ok(Json(ListManifestsResponse { ids }))
}

fn parse_id(id: &str) -> Result<ManifestId, AppError> {
    ManifestId::parse(id).map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Decodes a body and checks its content address and signature.
fn check_manifest(body: &[u8]) -> Result<Manifest, AppError> {
    let manifest: Manifest = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Body is not a manifest: {}", e)))?;

    manifest
        .check_id()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if let Some(block) = &manifest.signature {
        let bytes = claim_bytes(&manifest.claim)
            .map_err(|e| AppError::BadRequest(format!("Failed to canonicalize claim: {}", e)))?;
        if let Some(failure) = verify_declared(&bytes, block).failure {
            return Err(AppError::BadRequest(format!("Signature rejected: {}", failure)));
        }
    }

    Ok(manifest)
}
