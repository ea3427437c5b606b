// provgraph-core - Provenance manifest graph engine
//
// Manifests are immutable and content-addressed. Linking produces a new
// version that points back at its predecessor; nothing is edited in place.

pub mod attestation;
pub mod builder;
pub mod canonical;
pub mod config;
pub mod error;
pub mod export;
pub mod linker;
pub mod model;
pub mod storage;
pub mod validator;

pub use attestation::{open_envelope, sign_statement, Attestation, Statement};
pub use builder::{build, infer_media_type, seal, BuildRequest, IngredientSpec, ManifestMetadata};
pub use canonical::{claim_bytes, content_id};
pub use config::{EngineConfig, StorageConfig};
pub use error::{Error, ErrorClass, Result, StorageError};
pub use export::{export, history, Edge, ProvenanceGraph};
pub use linker::{link, LinkOptions, LinkPolicy};
pub use model::{Claim, Encoding, Ingredient, Manifest, ManifestId, ManifestKind};
pub use storage::{open, ListFilter, ManifestStore};
pub use validator::{
    validate, validate_graph, validate_manifest, verify_link, CheckKind, CheckResult, CheckStatus, GraphValidation,
    LinkVerification, ReasonCode, ValidationOptions, ValidationReport,
};

pub use provgraph_crypto::{Envelope, HashAlgorithm, SigningSecret};
