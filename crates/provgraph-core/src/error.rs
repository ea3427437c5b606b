// Error taxonomy for the manifest engine

use std::io;

use provgraph_crypto::CryptoError;
use serde::{Deserialize, Serialize};

use crate::model::ManifestId;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of a failure, used to tell "absent" apart from "corrupt".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Bad caller input; nothing was written
    Input,
    /// Content does not match its hash, signature or log proof
    Integrity,
    /// A manifest id does not resolve or cannot be linked
    Reference,
    /// Backend failure, possibly transient
    Storage,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Manifest must contain at least one ingredient")]
    EmptyIngredientSet,

    #[error("Duplicate ingredient name: '{0}'")]
    DuplicateIngredientName(String),

    #[error("Invalid manifest id '{0}' (expected urn:provgraph:sha256:<64 hex>)")]
    InvalidManifestId(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Manifest id mismatch: declared {declared}, computed {computed}")]
    IdMismatch {
        declared: ManifestId,
        computed: ManifestId,
    },

    #[error("Unknown manifest: {0}")]
    UnknownManifest(ManifestId),

    #[error("Manifest {0} cannot link to itself")]
    SelfLink(ManifestId),

    #[error("Manifest {source_id} already links to {target_id}")]
    DuplicateLink {
        source_id: ManifestId,
        target_id: ManifestId,
    },

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::EmptyIngredientSet
            | Error::DuplicateIngredientName(_)
            | Error::InvalidManifestId(_)
            | Error::InvalidConfig(_)
            | Error::Crypto(_)
            | Error::Encoding(_) => ErrorClass::Input,
            Error::IdMismatch { .. } => ErrorClass::Integrity,
            Error::UnknownManifest(_) | Error::SelfLink(_) | Error::DuplicateLink { .. } => {
                ErrorClass::Reference
            }
            Error::Storage(StorageError::NotFound(_)) => ErrorClass::Reference,
            Error::Storage(StorageError::IntegrityViolation(_)) => ErrorClass::Integrity,
            Error::Storage(_) => ErrorClass::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::UnknownManifest(_) | Error::Storage(StorageError::NotFound(_))
        )
    }

    /// Turns a backend "not found" for `id` into the caller-facing reference error.
    pub(crate) fn into_unknown(self, id: &ManifestId) -> Error {
        if self.is_not_found() {
            Error::UnknownManifest(id.clone())
        } else {
            self
        }
    }
}

/// Failures reported by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Manifest not found: {0}")]
    NotFound(ManifestId),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Storage rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error on {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt stored manifest at {location}: {detail}")]
    Corrupt { location: String, detail: String },
}

impl StorageError {
    /// Transient failures may succeed on retry; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }

    /// Maps an I/O error on `context`, surfacing permission problems distinctly.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        let context = context.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(context),
            _ => StorageError::Io { context, source },
        }
    }
}
