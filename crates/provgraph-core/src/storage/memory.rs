// In-memory manifest store for tests and ephemeral use

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use super::{encode_for_put, ListFilter, ManifestStore};
use crate::error::{Error, Result, StorageError};
use crate::model::{Manifest, ManifestId, ManifestKind};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<ManifestId, (ManifestKind, Vec<u8>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a manifest under its declared id without checking it against the claim.
    ///
    /// Models records written by tools that do not uphold this engine's invariants.
    pub fn seed(&self, manifest: &Manifest) -> Result<()> {
        let bytes = provgraph_crypto::jcs_canonical_bytes(manifest)?;
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(manifest.id.clone(), (manifest.kind(), bytes));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ManifestStore for MemoryStore {
    fn put(&self, manifest: &Manifest) -> Result<ManifestId> {
        let bytes = encode_for_put(manifest)?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&manifest.id) {
            debug!(id = %manifest.id, "Manifest already stored");
        } else {
            records.insert(manifest.id.clone(), (manifest.kind(), bytes));
        }
        Ok(manifest.id.clone())
    }

    fn get_encoded(&self, id: &ManifestId) -> Result<Vec<u8>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| Error::Storage(StorageError::NotFound(id.clone())))
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<ManifestId>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, (kind, _))| filter.matches(*kind))
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn exists(&self, id: &ManifestId) -> Result<bool> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
