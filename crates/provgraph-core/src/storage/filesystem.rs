// Filesystem backend: one file per manifest under <root>/<kind>/
//
// Writes go to a temp file in the destination directory and are moved into
// place without clobbering, so readers never observe a partial manifest.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{encode_for_put, ListFilter, ManifestStore};
use crate::error::{Error, Result, StorageError};
use crate::model::{Manifest, ManifestId, ManifestKind};

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| StorageError::io(root.display().to_string(), e))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a manifest of `kind` with `id` lives.
    pub fn manifest_path(&self, kind: ManifestKind, id: &ManifestId) -> PathBuf {
        self.root
            .join(kind.as_str())
            .join(format!("{}.{}", id.file_stem(), EXTENSION))
    }

    fn locate(&self, id: &ManifestId) -> Option<PathBuf> {
        ManifestKind::ALL
            .iter()
            .map(|kind| self.manifest_path(*kind, id))
            .find(|path| path.is_file())
    }
}

impl ManifestStore for FilesystemStore {
    fn put(&self, manifest: &Manifest) -> Result<ManifestId> {
        let bytes = encode_for_put(manifest)?;
        let path = self.manifest_path(manifest.kind(), &manifest.id);

        if path.is_file() {
            debug!(id = %manifest.id, path = %path.display(), "Manifest already stored");
            return Ok(manifest.id.clone());
        }

        let dir = self.root.join(manifest.kind().as_str());
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(dir.display().to_string(), e))?;

        let mut temp =
            NamedTempFile::new_in(&dir).map_err(|e| StorageError::io(dir.display().to_string(), e))?;
        temp.write_all(&bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| StorageError::io(temp.path().display().to_string(), e))?;

        match temp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(id = %manifest.id, path = %path.display(), "Wrote manifest");
            }
            // Lost a race against an identical write
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(id = %manifest.id, "Concurrent writer stored manifest first");
            }
            Err(e) => return Err(StorageError::io(path.display().to_string(), e.error).into()),
        }

        Ok(manifest.id.clone())
    }

    fn get_encoded(&self, id: &ManifestId) -> Result<Vec<u8>> {
        let path = self
            .locate(id)
            .ok_or_else(|| Error::Storage(StorageError::NotFound(id.clone())))?;
        fs::read(&path).map_err(|e| StorageError::io(path.display().to_string(), e).into())
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<ManifestId>> {
        let mut ids = Vec::new();

        for kind in ManifestKind::ALL.iter().filter(|k| filter.matches(**k)) {
            let dir = self.root.join(kind.as_str());
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(dir.display().to_string(), e).into()),
            };

            for entry in entries {
                let entry = entry.map_err(|e| StorageError::io(dir.display().to_string(), e))?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                    continue;
                }
                // Temp files and foreign files are not manifests
                if let Some(id) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| ManifestId::from_file_stem(s).ok())
                {
                    ids.push(id);
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    fn exists(&self, id: &ManifestId) -> Result<bool> {
        Ok(self.locate(id).is_some())
    }

    fn describe(&self) -> String {
        format!("filesystem:{}", self.root.display())
    }
}
