// Append-only transparency log backend
//
// Layout under the log root:
//   entries/<seq>.json  stored manifest bytes, one per append
//   index.json          seq -> (id, kind, leaf hash)
//   checkpoint.json     tree size and Merkle root after the last append
//   log.lock            advisory lock; exclusive for appends, shared for reads
//
// The checkpoint is the commit point. Index rows at or past its tree size were
// left by an append that failed before committing; reads ignore them and the
// next append overwrites them.
//
// Every read rebuilds an inclusion proof for the entry and checks it against
// the checkpoint root. A record that fails the proof is an integrity
// violation, never "not found".

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::merkle::{self, Hash};
use super::{encode_for_put, ListFilter, ManifestStore};
use crate::error::{Error, Result, StorageError};
use crate::model::{Manifest, ManifestId, ManifestKind};

const ENTRIES_DIR: &str = "entries";
const INDEX_FILE: &str = "index.json";
const CHECKPOINT_FILE: &str = "checkpoint.json";
const LOCK_FILE: &str = "log.lock";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    seq: u64,
    id: ManifestId,
    kind: ManifestKind,
    /// Hex SHA-256 of the entry bytes
    leaf_hash: String,
}

/// Signed-tree-head equivalent: what the log commits to after each append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub tree_size: u64,
    /// Hex Merkle root
    pub root: String,
}

#[derive(Deserialize)]
struct RecordId {
    id: ManifestId,
}

/// Any number of handles, in this process or others, may share one log root.
pub struct TransparencyLogStore {
    root: PathBuf,
}

impl TransparencyLogStore {
    pub fn open(root: &Path) -> Result<Self> {
        let entries = root.join(ENTRIES_DIR);
        fs::create_dir_all(&entries)
            .map_err(|e| StorageError::io(entries.display().to_string(), e))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Opens the lock file and blocks until the lock is held. Released on drop.
    fn lock(&self, exclusive: bool) -> Result<File> {
        let path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::io(path.display().to_string(), e))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| StorageError::io(path.display().to_string(), e))?;
        Ok(file)
    }

    /// Index rows covered by the checkpoint, plus the checkpoint itself.
    fn committed(&self) -> Result<(Vec<IndexEntry>, Option<Checkpoint>)> {
        let mut index = self.read_index()?;
        let checkpoint = self.checkpoint()?;
        let tree_size = checkpoint.as_ref().map_or(0, |c| c.tree_size as usize);
        if tree_size > index.len() {
            return Err(violation(format!(
                "checkpoint of size {} exceeds index of {} entries",
                tree_size,
                index.len()
            )));
        }
        if index.len() > tree_size {
            debug!(
                uncommitted = index.len() - tree_size,
                "Ignoring index rows past the checkpoint"
            );
            index.truncate(tree_size);
        }
        Ok((index, checkpoint))
    }

    /// Current checkpoint, if anything has been appended.
    pub fn checkpoint(&self) -> Result<Option<Checkpoint>> {
        self.read_json(&self.root.join(CHECKPOINT_FILE))
    }

    fn entry_path(&self, seq: u64) -> PathBuf {
        self.root.join(ENTRIES_DIR).join(format!("{:012}.json", seq))
    }

    fn read_index(&self) -> Result<Vec<IndexEntry>> {
        Ok(self
            .read_json(&self.root.join(INDEX_FILE))?
            .unwrap_or_default())
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, path: &Path) -> Result<Option<T>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path.display().to_string(), e).into()),
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            Error::Storage(StorageError::IntegrityViolation(format!(
                "{} is unreadable: {}",
                path.display(),
                e
            )))
        })
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        let mut temp =
            NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir.display().to_string(), e))?;
        temp.write_all(bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| StorageError::io(temp.path().display().to_string(), e))?;
        temp.persist(path)
            .map_err(|e| StorageError::io(path.display().to_string(), e.error))?;
        Ok(())
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| Error::Encoding(e.to_string()))?;
        self.write_atomic(path, &bytes)
    }
}

fn violation(detail: impl Into<String>) -> Error {
    Error::Storage(StorageError::IntegrityViolation(detail.into()))
}

fn decode_hash(hex_value: &str) -> Option<Hash> {
    let mut hash = [0u8; 32];
    hex::decode_to_slice(hex_value, &mut hash).ok()?;
    Some(hash)
}

impl ManifestStore for TransparencyLogStore {
    fn put(&self, manifest: &Manifest) -> Result<ManifestId> {
        let bytes = encode_for_put(manifest)?;
        let _lock = self.lock(true)?;

        let (mut index, _) = self.committed()?;
        if index.iter().any(|entry| entry.id == manifest.id) {
            debug!(id = %manifest.id, "Manifest already logged");
            return Ok(manifest.id.clone());
        }

        let seq = index.len() as u64;
        let leaf = merkle::entry_hash(&bytes);
        self.write_atomic(&self.entry_path(seq), &bytes)?;

        index.push(IndexEntry {
            seq,
            id: manifest.id.clone(),
            kind: manifest.kind(),
            leaf_hash: hex::encode(leaf),
        });
        self.write_json(&self.root.join(INDEX_FILE), &index)?;

        let leaves = index
            .iter()
            .map(|entry| decode_hash(&entry.leaf_hash))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| violation("index holds a malformed leaf hash"))?;
        let checkpoint = Checkpoint {
            tree_size: leaves.len() as u64,
            root: hex::encode(merkle::root(&leaves)),
        };
        self.write_json(&self.root.join(CHECKPOINT_FILE), &checkpoint)?;

        info!(id = %manifest.id, seq, tree_size = checkpoint.tree_size, "Appended manifest to log");
        Ok(manifest.id.clone())
    }

    fn get_encoded(&self, id: &ManifestId) -> Result<Vec<u8>> {
        let _lock = self.lock(false)?;
        let (index, checkpoint) = self.committed()?;
        let position = index
            .iter()
            .position(|entry| entry.id == *id)
            .ok_or_else(|| Error::Storage(StorageError::NotFound(id.clone())))?;
        let entry = &index[position];

        // A non-empty committed prefix implies a checkpoint
        let checkpoint = checkpoint.ok_or_else(|| violation("log has entries but no checkpoint"))?;
        let tree_size = checkpoint.tree_size as usize;
        if entry.seq != position as u64 {
            return Err(violation(format!(
                "index row {} claims sequence number {}",
                position, entry.seq
            )));
        }

        let path = self.entry_path(entry.seq);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => violation(format!("entry file {} is missing", path.display())),
            _ => StorageError::io(path.display().to_string(), e).into(),
        })?;

        let leaves = index[..tree_size]
            .iter()
            .map(|e| decode_hash(&e.leaf_hash))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| violation("index holds a malformed leaf hash"))?;
        let actual = merkle::entry_hash(&bytes);
        if actual != leaves[position] {
            return Err(violation(format!(
                "entry {} bytes do not match the logged leaf hash",
                entry.seq
            )));
        }

        let root = decode_hash(&checkpoint.root)
            .ok_or_else(|| violation("checkpoint root is malformed"))?;
        let proof = merkle::inclusion_proof(&leaves, position)
            .ok_or_else(|| violation("cannot build inclusion proof"))?;
        if !merkle::verify_inclusion(&actual, &proof, &root) {
            return Err(violation(format!(
                "inclusion proof for entry {} does not match checkpoint root",
                entry.seq
            )));
        }

        let record: RecordId = serde_json::from_slice(&bytes)
            .map_err(|e| violation(format!("entry {} does not decode: {}", entry.seq, e)))?;
        if record.id != *id {
            return Err(violation(format!(
                "entry {} holds {} but is indexed as {}",
                entry.seq, record.id, id
            )));
        }

        debug!(id = %id, seq = entry.seq, "Verified inclusion");
        Ok(bytes)
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<ManifestId>> {
        let _lock = self.lock(false)?;
        let mut ids: Vec<ManifestId> = self
            .committed()?
            .0
            .into_iter()
            .filter(|entry| filter.matches(entry.kind))
            .map(|entry| entry.id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn exists(&self, id: &ManifestId) -> Result<bool> {
        let _lock = self.lock(false)?;
        Ok(self.committed()?.0.iter().any(|entry| entry.id == *id))
    }

    fn describe(&self) -> String {
        format!("transparency-log:{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::manifest;

    fn open_log() -> (tempfile::TempDir, TransparencyLogStore) {
        let dir = tempfile::tempdir().unwrap();
        let log = TransparencyLogStore::open(dir.path()).unwrap();
        (dir, log)
    }

    fn is_violation(result: Result<Manifest>) -> bool {
        matches!(result, Err(Error::Storage(StorageError::IntegrityViolation(_))))
    }

    #[test]
    fn test_append_and_verified_read() {
        let (_dir, log) = open_log();
        let a = manifest("a", ManifestKind::Dataset);
        let b = manifest("b", ManifestKind::Model);
        let c = manifest("c", ManifestKind::Model);

        for m in [&a, &b, &c] {
            log.put(m).unwrap();
        }

        assert_eq!(log.checkpoint().unwrap().unwrap().tree_size, 3);
        assert_eq!(log.get(&a.id).unwrap(), a);
        assert_eq!(log.get(&b.id).unwrap(), b);
        assert_eq!(log.get(&c.id).unwrap(), c);
    }

    #[test]
    fn test_put_is_idempotent() {
        let (_dir, log) = open_log();
        let a = manifest("a", ManifestKind::Dataset);

        log.put(&a).unwrap();
        let checkpoint = log.checkpoint().unwrap();
        log.put(&a).unwrap();

        assert_eq!(log.checkpoint().unwrap(), checkpoint);
        assert_eq!(log.list(&ListFilter::default()).unwrap(), vec![a.id]);
    }

    #[test]
    fn test_missing_is_not_found() {
        let (_dir, log) = open_log();
        log.put(&manifest("a", ManifestKind::Dataset)).unwrap();

        let ghost = manifest("ghost", ManifestKind::Dataset);
        assert!(matches!(
            log.get(&ghost.id),
            Err(Error::Storage(StorageError::NotFound(_)))
        ));
    }

    #[test]
    fn test_tampered_entry_is_integrity_violation() {
        let (dir, log) = open_log();
        let a = manifest("a", ManifestKind::Dataset);
        let b = manifest("b", ManifestKind::Dataset);
        log.put(&a).unwrap();
        log.put(&b).unwrap();

        let path = dir.path().join(ENTRIES_DIR).join(format!("{:012}.json", 0));
        let mut tampered = a.clone();
        tampered.claim.title = "forged".to_string();
        fs::write(&path, serde_json::to_vec(&tampered).unwrap()).unwrap();

        assert!(is_violation(log.get(&a.id)));
        // Other entries remain readable
        assert_eq!(log.get(&b.id).unwrap(), b);
    }

    #[test]
    fn test_rewritten_index_fails_proof() {
        let (dir, log) = open_log();
        let a = manifest("a", ManifestKind::Dataset);
        let b = manifest("b", ManifestKind::Model);
        log.put(&a).unwrap();
        log.put(&b).unwrap();

        // Swap the entry and fix up its leaf hash, leaving the checkpoint alone
        let mut forged = b.clone();
        forged.claim.title = "forged".to_string();
        let bytes = provgraph_crypto::jcs_canonical_bytes(&forged).unwrap();
        fs::write(dir.path().join(ENTRIES_DIR).join(format!("{:012}.json", 1)), &bytes).unwrap();

        let mut index = log.read_index().unwrap();
        index[1].leaf_hash = hex::encode(merkle::entry_hash(&bytes));
        log.write_json(&dir.path().join(INDEX_FILE), &index).unwrap();

        assert!(is_violation(log.get(&b.id)));
    }

    #[test]
    fn test_deleted_entry_is_integrity_violation() {
        let (dir, log) = open_log();
        let a = manifest("a", ManifestKind::Dataset);
        log.put(&a).unwrap();

        fs::remove_file(dir.path().join(ENTRIES_DIR).join(format!("{:012}.json", 0))).unwrap();
        assert!(is_violation(log.get(&a.id)));
        // Still indexed, so it "exists"; only reads verify
        assert!(log.exists(&a.id).unwrap());
    }

    #[test]
    fn test_concurrent_handles_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let manifests: Vec<Manifest> = (0..8)
            .map(|i| manifest(&format!("writer-{}", i), ManifestKind::Dataset))
            .collect();

        std::thread::scope(|scope| {
            for m in &manifests {
                let root = dir.path();
                scope.spawn(move || {
                    let handle = TransparencyLogStore::open(root).unwrap();
                    handle.put(m).unwrap();
                });
            }
        });

        let log = TransparencyLogStore::open(dir.path()).unwrap();
        assert_eq!(log.checkpoint().unwrap().unwrap().tree_size, 8);
        for m in &manifests {
            assert_eq!(log.get(&m.id).unwrap(), *m);
        }
        assert_eq!(log.list(&ListFilter::default()).unwrap().len(), 8);
    }

    #[test]
    fn test_interrupted_append_is_not_committed() {
        let (dir, log) = open_log();
        let a = manifest("a", ManifestKind::Dataset);
        let b = manifest("b", ManifestKind::Model);
        log.put(&a).unwrap();
        let committed = fs::read(dir.path().join(CHECKPOINT_FILE)).unwrap();

        // Entry and index written, checkpoint never advanced
        log.put(&b).unwrap();
        fs::write(dir.path().join(CHECKPOINT_FILE), &committed).unwrap();

        assert!(matches!(
            log.get(&b.id),
            Err(Error::Storage(StorageError::NotFound(_)))
        ));
        assert!(!log.exists(&b.id).unwrap());
        assert_eq!(log.list(&ListFilter::default()).unwrap(), vec![a.id.clone()]);

        // Retrying commits it
        log.put(&b).unwrap();
        assert_eq!(log.checkpoint().unwrap().unwrap().tree_size, 2);
        assert_eq!(log.get(&b.id).unwrap(), b);
        assert_eq!(log.get(&a.id).unwrap(), a);
    }

    #[test]
    fn test_uncommitted_slot_is_reused() {
        let (dir, log) = open_log();
        let a = manifest("a", ManifestKind::Dataset);
        let b = manifest("b", ManifestKind::Model);
        let c = manifest("c", ManifestKind::Model);
        log.put(&a).unwrap();
        let committed = fs::read(dir.path().join(CHECKPOINT_FILE)).unwrap();
        log.put(&b).unwrap();
        fs::write(dir.path().join(CHECKPOINT_FILE), &committed).unwrap();

        log.put(&c).unwrap();
        assert_eq!(log.checkpoint().unwrap().unwrap().tree_size, 2);
        assert_eq!(log.get(&c.id).unwrap(), c);
        assert!(!log.exists(&b.id).unwrap());
    }

    #[test]
    fn test_failed_checkpoint_read_persists_nothing() {
        let (dir, log) = open_log();
        let a = manifest("a", ManifestKind::Dataset);
        let b = manifest("b", ManifestKind::Dataset);
        log.put(&a).unwrap();

        let checkpoint_path = dir.path().join(CHECKPOINT_FILE);
        let committed = fs::read(&checkpoint_path).unwrap();
        fs::remove_file(&checkpoint_path).unwrap();
        fs::create_dir(&checkpoint_path).unwrap();
        assert!(log.put(&b).is_err());

        fs::remove_dir(&checkpoint_path).unwrap();
        fs::write(&checkpoint_path, &committed).unwrap();
        log.put(&b).unwrap();
        assert_eq!(log.get(&b.id).unwrap(), b);
        assert_eq!(log.get(&a.id).unwrap(), a);
    }

    #[test]
    fn test_reopen_preserves_log() {
        let dir = tempfile::tempdir().unwrap();
        let a = manifest("a", ManifestKind::Software);
        TransparencyLogStore::open(dir.path()).unwrap().put(&a).unwrap();

        let reopened = TransparencyLogStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&a.id).unwrap(), a);
        assert_eq!(
            reopened.list(&ListFilter::kind(ManifestKind::Software)).unwrap(),
            vec![a.id]
        );
        assert!(reopened.list(&ListFilter::kind(ManifestKind::Model)).unwrap().is_empty());
    }
}
