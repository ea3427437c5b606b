// Artifact hashing for provenance manifests
//
// Files are streamed through the digest in fixed-size chunks so large
// model weights never need to fit in memory. Directories hash to a digest
// over their sorted relative paths and per-file digests.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::CryptoError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Digest algorithms accepted for ingredient hashes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of a hex-encoded digest produced by this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 => 96,
            HashAlgorithm::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(CryptoError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Incremental hasher over one of the supported algorithms.
enum StreamingHasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl StreamingHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => StreamingHasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => StreamingHasher::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => StreamingHasher::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            StreamingHasher::Sha256(h) => h.update(bytes),
            StreamingHasher::Sha384(h) => h.update(bytes),
            StreamingHasher::Sha512(h) => h.update(bytes),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            StreamingHasher::Sha256(h) => hex::encode(h.finalize()),
            StreamingHasher::Sha384(h) => hex::encode(h.finalize()),
            StreamingHasher::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Result of hashing an artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDigest {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub value: String,
    /// Bytes hashed (sum over all files for a directory)
    pub size: u64,
    pub is_directory: bool,
}

/// Computes the digest of `bytes` and returns it as a lowercase hex string.
pub fn hash_bytes(bytes: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = StreamingHasher::new(algorithm);
    hasher.update(bytes);
    hasher.finalize_hex()
}

/// Compares two hex digests case-insensitively without early exit on the first differing byte.
pub fn digests_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x.to_ascii_lowercase() ^ y.to_ascii_lowercase()))
        == 0
}

/// Streams a reader through the digest, returning the hex digest and the byte count.
pub fn hash_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> io::Result<(String, u64)> {
    let mut hasher = StreamingHasher::new(algorithm);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    Ok((hasher.finalize_hex(), total))
}

/// Hashes a single regular file.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<ArtifactDigest, CryptoError> {
    let file = File::open(path).map_err(|e| unreadable(path, e))?;
    let (value, size) =
        hash_reader(BufReader::new(file), algorithm).map_err(|e| unreadable(path, e))?;

    Ok(ArtifactDigest {
        algorithm,
        value,
        size,
        is_directory: false,
    })
}

/// Hashes a file or a directory tree.
pub fn hash_path(path: &Path, algorithm: HashAlgorithm) -> Result<ArtifactDigest, CryptoError> {
    let metadata = fs::metadata(path).map_err(|e| unreadable(path, e))?;
    if metadata.is_dir() {
        hash_directory(path, algorithm)
    } else {
        hash_file(path, algorithm)
    }
}

/// Hashes a directory as the digest over `"<relative path>\0<file digest>\n"`
/// lines, one per regular file, sorted by relative path.
///
/// The walk uses an explicit stack. Symlinks to files are hashed through;
/// symlinked directories are not descended into.
fn hash_directory(root: &Path, algorithm: HashAlgorithm) -> Result<ArtifactDigest, CryptoError> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| unreadable(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| unreadable(&dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| unreadable(&path, e))?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push((relative_name(root, &path), path));
            } else if file_type.is_symlink() {
                if let Ok(target) = fs::metadata(&path) {
                    if target.is_file() {
                        files.push((relative_name(root, &path), path));
                    }
                }
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut outer = StreamingHasher::new(algorithm);
    let mut size = 0u64;
    for (name, path) in &files {
        let digest = hash_file(path, algorithm)?;
        outer.update(name.as_bytes());
        outer.update(&[0]);
        outer.update(digest.value.as_bytes());
        outer.update(b"\n");
        size += digest.size;
    }

    Ok(ArtifactDigest {
        algorithm,
        value: outer.finalize_hex(),
        size,
        is_directory: true,
    })
}

/// Relative path with `/` separators so digests match across platforms.
fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn unreadable(path: &Path, source: io::Error) -> CryptoError {
    CryptoError::ArtifactUnreadable {
        path: path.to_path_buf(),
        source,
    }
}
