//! Storage abstraction over interchangeable manifest backends.
//!
//! Every backend stores the RFC 8785 encoding of the whole manifest, so a
//! manifest always round-trips to byte-identical content and two writers of
//! the same manifest produce the same record.

mod database;
mod filesystem;
mod memory;
pub mod merkle;
mod retry;
mod transparency;

pub use database::DatabaseStore;
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;
pub use retry::RetryPolicy;
pub use transparency::{Checkpoint, TransparencyLogStore};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::StorageConfig;
use crate::error::{Error, Result, StorageError};
use crate::model::{Manifest, ManifestId, ManifestKind};

/// Restricts `list` results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    pub kind: Option<ManifestKind>,
}

impl ListFilter {
    pub fn kind(kind: ManifestKind) -> Self {
        Self { kind: Some(kind) }
    }

    pub fn matches(&self, kind: ManifestKind) -> bool {
        self.kind.map_or(true, |k| k == kind)
    }
}

/// Capability set every backend implements.
pub trait ManifestStore: Send + Sync {
    /// Stores a manifest and returns its id. Storing an existing id is a no-op success.
    fn put(&self, manifest: &Manifest) -> Result<ManifestId>;

    /// Returns the stored bytes for `id`.
    fn get_encoded(&self, id: &ManifestId) -> Result<Vec<u8>>;

    /// Ids in ascending order.
    fn list(&self, filter: &ListFilter) -> Result<Vec<ManifestId>>;

    fn exists(&self, id: &ManifestId) -> Result<bool>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;

    fn get(&self, id: &ManifestId) -> Result<Manifest> {
        let bytes = self.get_encoded(id)?;
        decode_stored(id, &bytes)
    }
}

/// Selects and opens the backend named by `config`.
pub fn open(config: &StorageConfig) -> Result<Box<dyn ManifestStore>> {
    let store: Box<dyn ManifestStore> = match config {
        StorageConfig::Filesystem { path } => Box::new(FilesystemStore::open(path)?),
        StorageConfig::Database {
            url,
            retry,
            timeout_secs,
        } => Box::new(DatabaseStore::new(url, retry.clone(), *timeout_secs)?),
        StorageConfig::TransparencyLog { path } => Box::new(TransparencyLogStore::open(path)?),
        StorageConfig::Memory => Box::new(MemoryStore::new()),
    };
    info!(backend = %store.describe(), "Opened manifest store");
    Ok(store)
}

/// Checks the id against the claim and returns the bytes to store.
pub(crate) fn encode_for_put(manifest: &Manifest) -> Result<Vec<u8>> {
    manifest.check_id()?;
    Ok(provgraph_crypto::jcs_canonical_bytes(manifest)?)
}

/// Decodes stored bytes, requiring the record to carry the id it was stored under.
pub(crate) fn decode_stored(id: &ManifestId, bytes: &[u8]) -> Result<Manifest> {
    let manifest: Manifest = serde_json::from_slice(bytes).map_err(|e| {
        Error::Storage(StorageError::Corrupt {
            location: id.to_string(),
            detail: e.to_string(),
        })
    })?;

    if manifest.id != *id {
        return Err(Error::Storage(StorageError::Corrupt {
            location: id.to_string(),
            detail: format!("record carries id {}", manifest.id),
        }));
    }
    Ok(manifest)
}
