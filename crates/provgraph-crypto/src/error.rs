// Error type for the crypto primitives

use std::io;
use std::path::PathBuf;

/// Errors raised while hashing artifacts, canonicalizing content or handling keys.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Artifact unreadable: {}: {source}", path.display())]
    ArtifactUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unsupported hash algorithm: '{0}' (expected sha256, sha384 or sha512)")]
    UnsupportedAlgorithm(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Key file unreadable: {}: {source}", path.display())]
    KeyUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Canonicalization failed: {0}")]
    Canonicalization(String),
}
