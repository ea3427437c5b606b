//! Row types for stored manifests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A manifest as stored: its canonical JSON plus indexed columns.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ManifestRecord {
    /// Content-addressed id (urn:provgraph:sha256:...)
    pub id: String,
    pub kind: String,
    /// RFC 8785 canonical JSON of the full manifest
    pub body: String,
    /// Claim creation time
    pub created_at: DateTime<Utc>,
    pub stored_at: DateTime<Utc>,
}

/// Data required to store a new manifest.
#[derive(Debug, Clone)]
pub struct NewManifestRecord {
    pub id: String,
    pub kind: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
