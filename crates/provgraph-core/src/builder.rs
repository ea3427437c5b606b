//! Manifest Builder.
//!
//! Hashes ingredient artifacts, assembles the claim, derives the id and
//! optionally signs. Nothing here writes to storage; callers decide whether
//! and where to persist the result.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use provgraph_crypto::{hash_path, sign, CryptoError, HashAlgorithm, SigningSecret};
use tracing::{debug, info};

use crate::canonical;
use crate::error::{Error, Result};
use crate::model::{file_url, Claim, Ingredient, Manifest, ManifestId, ManifestKind};

/// An artifact to hash into an ingredient.
#[derive(Debug, Clone)]
pub struct IngredientSpec {
    pub name: String,
    pub path: PathBuf,
    /// Inferred from the file extension when absent
    pub media_type: Option<String>,
    pub hash_algorithm: HashAlgorithm,
}

impl IngredientSpec {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            media_type: None,
            hash_algorithm: HashAlgorithm::default(),
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }
}

/// Descriptive fields of a claim.
#[derive(Debug, Clone, Default)]
pub struct ManifestMetadata {
    pub title: String,
    pub author_org: Option<String>,
    pub author_name: Option<String>,
    pub description: Option<String>,
    pub annotations: Option<serde_json::Value>,
}

impl ManifestMetadata {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub kind: ManifestKind,
    pub ingredients: Vec<IngredientSpec>,
    pub metadata: ManifestMetadata,
    pub linked_manifests: BTreeSet<ManifestId>,
    pub previous_version: Option<ManifestId>,
    /// Defaults to now; sub-second precision is always dropped
    pub created_at: Option<DateTime<Utc>>,
}

impl BuildRequest {
    pub fn new(kind: ManifestKind, metadata: ManifestMetadata) -> Self {
        Self {
            kind,
            ingredients: Vec::new(),
            metadata,
            linked_manifests: BTreeSet::new(),
            previous_version: None,
            created_at: None,
        }
    }

    pub fn ingredient(mut self, spec: IngredientSpec) -> Self {
        self.ingredients.push(spec);
        self
    }

    pub fn link(mut self, target: ManifestId) -> Self {
        self.linked_manifests.insert(target);
        self
    }

    pub fn previous_version(mut self, id: ManifestId) -> Self {
        self.previous_version = Some(id);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// Builds a manifest from artifacts on disk.
///
/// Fails with [`Error::EmptyIngredientSet`] or [`Error::DuplicateIngredientName`]
/// before any artifact is read.
pub fn build(request: BuildRequest, signer: Option<&SigningSecret>) -> Result<Manifest> {
    if request.ingredients.is_empty() {
        return Err(Error::EmptyIngredientSet);
    }

    let mut seen = HashSet::new();
    for spec in &request.ingredients {
        if !seen.insert(spec.name.as_str()) {
            return Err(Error::DuplicateIngredientName(spec.name.clone()));
        }
    }

    let ingredients = request
        .ingredients
        .iter()
        .map(hash_ingredient)
        .collect::<Result<Vec<_>>>()?;

    let created_at = request.created_at.unwrap_or_else(Utc::now).trunc_subsecs(0);

    let claim = Claim {
        title: request.metadata.title,
        author_org: request.metadata.author_org,
        author_name: request.metadata.author_name,
        description: request.metadata.description,
        kind: request.kind,
        ingredients,
        linked_manifests: request.linked_manifests,
        previous_version: request.previous_version,
        created_at,
        annotations: request.metadata.annotations,
    };

    let manifest = seal(claim, signer)?;
    info!(
        id = %manifest.id,
        kind = %manifest.kind(),
        signed = manifest.signature.is_some(),
        "Built manifest"
    );
    Ok(manifest)
}

/// Derives the id from the claim's canonical bytes and signs those same bytes.
pub fn seal(claim: Claim, signer: Option<&SigningSecret>) -> Result<Manifest> {
    let bytes = canonical::claim_bytes(&claim)?;
    let id = canonical::id_for_bytes(&bytes);
    let signature = signer.map(|secret| sign(&bytes, secret)).transpose()?;

    Ok(Manifest {
        id,
        claim,
        signature,
    })
}

fn hash_ingredient(spec: &IngredientSpec) -> Result<Ingredient> {
    let absolute = fs::canonicalize(&spec.path).map_err(|source| CryptoError::ArtifactUnreadable {
        path: spec.path.clone(),
        source,
    })?;

    let digest = hash_path(&absolute, spec.hash_algorithm)?;
    debug!(
        name = %spec.name,
        path = %absolute.display(),
        algorithm = %digest.algorithm,
        size = digest.size,
        "Hashed ingredient"
    );

    let media_type = spec
        .media_type
        .clone()
        .unwrap_or_else(|| infer_media_type(&absolute, digest.is_directory).to_string());

    Ok(Ingredient {
        name: spec.name.clone(),
        hash: digest.value,
        hash_algorithm: digest.algorithm,
        media_type,
        size: digest.size,
        location: Some(file_url(&absolute)),
    })
}

/// Guesses a media type from the file extension.
pub fn infer_media_type(path: &Path, is_directory: bool) -> &'static str {
    if is_directory {
        return "inode/directory";
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "jsonl" | "ndjson" => "application/jsonl",
        "yaml" | "yml" => "application/yaml",
        "parquet" => "application/vnd.apache.parquet",
        "onnx" => "application/onnx",
        "pt" | "pth" => "application/x-pytorch",
        "safetensors" => "application/x-safetensors",
        "h5" | "hdf5" => "application/x-hdf5",
        "pkl" | "pickle" => "application/x-pickle",
        "npy" | "npz" => "application/x-numpy",
        "py" => "text/x-python",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        _ => "application/octet-stream",
    }
}
