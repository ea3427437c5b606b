//! Data model for provenance manifests.
//!
//! A [`Manifest`] is an id, a [`Claim`] and an optional signature. The id and
//! the signature both cover the canonical bytes of the claim alone, so neither
//! participates in its own derivation.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use provgraph_crypto::{HashAlgorithm, SignatureBlock};
use serde::{Deserialize, Serialize};

use crate::attestation::Statement;
use crate::canonical;
use crate::error::{Error, Result};

/// URN prefix of every manifest id. The digest is always SHA-256.
pub const ID_PREFIX: &str = "urn:provgraph:sha256:";

const FILE_URL_PREFIX: &str = "file://";

/// Content-addressed manifest identifier: `urn:provgraph:sha256:<64 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ManifestId(String);

impl ManifestId {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let digest = text
            .strip_prefix(ID_PREFIX)
            .ok_or_else(|| Error::InvalidManifestId(text.to_string()))?;

        let well_formed = digest.len() == 64
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(Error::InvalidManifestId(text.to_string()));
        }

        Ok(Self(text.to_string()))
    }

    /// Builds an id from a lowercase SHA-256 hex digest.
    pub(crate) fn from_digest(hex_digest: &str) -> Self {
        Self(format!("{}{}", ID_PREFIX, hex_digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digest part of the URN.
    pub fn digest(&self) -> &str {
        &self.0[ID_PREFIX.len()..]
    }

    /// File-name-safe form (`:` replaced by `_`).
    pub fn file_stem(&self) -> String {
        self.0.replace(':', "_")
    }

    pub fn from_file_stem(stem: &str) -> Result<Self> {
        Self::parse(&stem.replace('_', ":"))
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ManifestId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ManifestId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ManifestId> for String {
    fn from(id: ManifestId) -> Self {
        id.0
    }
}

/// What a manifest describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    Dataset,
    Model,
    Software,
    Evaluation,
}

impl ManifestKind {
    pub const ALL: [ManifestKind; 4] = [
        ManifestKind::Dataset,
        ManifestKind::Model,
        ManifestKind::Software,
        ManifestKind::Evaluation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestKind::Dataset => "dataset",
            ManifestKind::Model => "model",
            ManifestKind::Software => "software",
            ManifestKind::Evaluation => "evaluation",
        }
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManifestKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dataset" => Ok(ManifestKind::Dataset),
            "model" => Ok(ManifestKind::Model),
            "software" => Ok(ManifestKind::Software),
            "evaluation" => Ok(ManifestKind::Evaluation),
            other => Err(Error::InvalidConfig(format!(
                "unknown manifest kind '{}' (expected dataset, model, software or evaluation)",
                other
            ))),
        }
    }
}

/// One hashed artifact referenced by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    /// Lowercase hex digest
    pub hash: String,
    pub hash_algorithm: HashAlgorithm,
    pub media_type: String,
    pub size: u64,
    /// Absolute `file://` URL the artifact was hashed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Ingredient {
    /// Local path recorded in `location`, if it is a `file://` URL.
    pub fn local_path(&self) -> Option<PathBuf> {
        self.location
            .as_deref()
            .and_then(|loc| loc.strip_prefix(FILE_URL_PREFIX))
            .map(PathBuf::from)
    }
}

/// Formats an absolute path as a `file://` URL.
pub(crate) fn file_url(path: &std::path::Path) -> String {
    format!("{}{}", FILE_URL_PREFIX, path.display())
}

/// Every content field of a manifest. Its canonical bytes define the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_org: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub kind: ManifestKind,

    pub ingredients: Vec<Ingredient>,

    #[serde(default)]
    pub linked_manifests: BTreeSet<ManifestId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<ManifestId>,

    pub created_at: DateTime<Utc>,

    /// Free-form user metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
}

/// A sealed provenance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: ManifestId,
    pub claim: Claim,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBlock>,
}

impl Manifest {
    pub fn kind(&self) -> ManifestKind {
        self.claim.kind
    }

    /// Recomputes the id from the claim.
    pub fn computed_id(&self) -> Result<ManifestId> {
        canonical::content_id(&self.claim)
    }

    /// Fails with [`Error::IdMismatch`] unless the declared id matches the claim.
    pub fn check_id(&self) -> Result<()> {
        let computed = self.computed_id()?;
        if computed != self.id {
            return Err(Error::IdMismatch {
                declared: self.id.clone(),
                computed,
            });
        }
        Ok(())
    }

    pub fn encode(&self, encoding: Encoding) -> Result<Vec<u8>> {
        match encoding {
            Encoding::Json => serde_json::to_vec_pretty(self).map_err(encoding_error),
            Encoding::CanonicalJson => Ok(provgraph_crypto::jcs_canonical_bytes(self)?),
            Encoding::Cbor => {
                let mut buf = Vec::new();
                ciborium::into_writer(self, &mut buf).map_err(encoding_error)?;
                Ok(buf)
            }
            Encoding::InToto => {
                serde_json::to_vec_pretty(&Statement::for_manifest(self)).map_err(encoding_error)
            }
        }
    }

    pub fn decode(bytes: &[u8], encoding: Encoding) -> Result<Self> {
        match encoding {
            Encoding::Json | Encoding::CanonicalJson => {
                serde_json::from_slice(bytes).map_err(encoding_error)
            }
            Encoding::Cbor => ciborium::from_reader(bytes).map_err(encoding_error),
            Encoding::InToto => serde_json::from_slice::<Statement>(bytes)
                .map_err(encoding_error)?
                .into_manifest(),
        }
    }
}

fn encoding_error(e: impl fmt::Display) -> Error {
    Error::Encoding(e.to_string())
}

/// Output encodings for a manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// RFC 8785 JSON, the stored form
    CanonicalJson,
    Cbor,
    /// Unsigned in-toto Statement with the manifest as predicate
    InToto,
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Encoding::Json),
            "canonical-json" | "jcs" => Ok(Encoding::CanonicalJson),
            "cbor" => Ok(Encoding::Cbor),
            "in-toto" | "intoto" | "statement" => Ok(Encoding::InToto),
            other => Err(Error::InvalidConfig(format!(
                "unknown encoding '{}' (expected json, canonical-json, cbor or in-toto)",
                other
            ))),
        }
    }
}
