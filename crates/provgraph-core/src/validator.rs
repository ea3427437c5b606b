//! Validator.
//!
//! `validate` checks one manifest and reports every facet independently:
//! content address, signature, each ingredient, each link and the previous
//! version. A failing facet never stops the remaining checks.
//!
//! Validation is not transitive. Linked manifests are checked for
//! resolvability only; [`validate_graph`] validates every node of an exported
//! graph when transitive results are wanted.

use std::collections::BTreeMap;

use provgraph_crypto::{digests_equal, hash_path, verify_declared, VerifyFailure};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::canonical;
use crate::error::{Error, ErrorClass, Result, StorageError};
use crate::export::{export, ProvenanceGraph};
use crate::model::{Ingredient, Manifest, ManifestId};
use crate::storage::ManifestStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Treat an unsigned manifest as a failure instead of skipping the check
    #[serde(default)]
    pub require_signature: bool,

    /// When non-empty, only these did:key fingerprints are accepted
    #[serde(default)]
    pub trusted_signers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckKind {
    ContentAddress,
    Signature,
    Ingredient,
    LinkedManifest,
    PreviousVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// Could not be checked (artifact moved); not a failure
    Unavailable,
    Skipped,
}

/// Machine-readable outcome of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Ok,
    IdMismatch,
    SignatureMismatch,
    MalformedSignature,
    FingerprintMismatch,
    InvalidKeyFormat,
    MissingSignature,
    Unsigned,
    UntrustedSigner,
    HashMismatch,
    ArtifactUnavailable,
    UnknownManifest,
    IntegrityViolation,
    IngredientsChanged,
    LinksRemoved,
    NotLinked,
}

impl ReasonCode {
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            ReasonCode::Ok | ReasonCode::Unsigned | ReasonCode::ArtifactUnavailable => None,
            ReasonCode::MissingSignature | ReasonCode::InvalidKeyFormat => Some(ErrorClass::Input),
            ReasonCode::IdMismatch
            | ReasonCode::SignatureMismatch
            | ReasonCode::MalformedSignature
            | ReasonCode::FingerprintMismatch
            | ReasonCode::UntrustedSigner
            | ReasonCode::HashMismatch
            | ReasonCode::IntegrityViolation
            | ReasonCode::IngredientsChanged
            | ReasonCode::LinksRemoved => Some(ErrorClass::Integrity),
            ReasonCode::UnknownManifest | ReasonCode::NotLinked => Some(ErrorClass::Reference),
        }
    }
}

impl From<VerifyFailure> for ReasonCode {
    fn from(failure: VerifyFailure) -> Self {
        match failure {
            VerifyFailure::SignatureMismatch => ReasonCode::SignatureMismatch,
            VerifyFailure::MalformedSignature => ReasonCode::MalformedSignature,
            VerifyFailure::FingerprintMismatch => ReasonCode::FingerprintMismatch,
            VerifyFailure::InvalidKeyFormat => ReasonCode::InvalidKeyFormat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: CheckKind,
    /// What was checked: the manifest id, an ingredient name or a linked id
    pub subject: String,
    pub status: CheckStatus,
    pub reason: ReasonCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ErrorClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn new(check: CheckKind, subject: impl Into<String>, status: CheckStatus, reason: ReasonCode) -> Self {
        Self {
            check,
            subject: subject.into(),
            status,
            reason,
            class: reason.class(),
            detail: None,
        }
    }

    fn pass(check: CheckKind, subject: impl Into<String>) -> Self {
        Self::new(check, subject, CheckStatus::Pass, ReasonCode::Ok)
    }

    fn fail(check: CheckKind, subject: impl Into<String>, reason: ReasonCode) -> Self {
        Self::new(check, subject, CheckStatus::Fail, reason)
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub manifest_id: ManifestId,
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    /// True when no check failed. Unavailable and skipped checks do not fail a report.
    pub fn passed(&self) -> bool {
        !self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Fail)
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }
}

/// Validates a single manifest. A missing manifest is `Err(UnknownManifest)`.
pub fn validate(
    id: &ManifestId,
    store: &dyn ManifestStore,
    options: &ValidationOptions,
) -> Result<ValidationReport> {
    let manifest = store.get(id).map_err(|e| e.into_unknown(id))?;
    validate_manifest(&manifest, store, options)
}

/// Validates an already-loaded manifest against `store`.
pub fn validate_manifest(
    manifest: &Manifest,
    store: &dyn ManifestStore,
    options: &ValidationOptions,
) -> Result<ValidationReport> {
    let mut checks = Vec::new();

    checks.push(check_content_address(manifest)?);
    checks.push(check_signature(manifest, options)?);
    checks.extend(manifest.claim.ingredients.iter().map(check_ingredient));
    for target in &manifest.claim.linked_manifests {
        checks.push(check_link(target, store)?);
    }
    if let Some(previous) = &manifest.claim.previous_version {
        checks.push(check_previous_version(manifest, previous, store)?);
    }

    let report = ValidationReport {
        manifest_id: manifest.id.clone(),
        checks,
    };
    debug!(
        id = %report.manifest_id,
        passed = report.passed(),
        checks = report.checks.len(),
        "Validated manifest"
    );
    Ok(report)
}

fn check_content_address(manifest: &Manifest) -> Result<CheckResult> {
    let computed = manifest.computed_id()?;
    let subject = manifest.id.to_string();
    Ok(if computed == manifest.id {
        CheckResult::pass(CheckKind::ContentAddress, subject)
    } else {
        CheckResult::fail(CheckKind::ContentAddress, subject, ReasonCode::IdMismatch)
            .with_detail(format!("claim hashes to {}", computed))
    })
}

fn check_signature(manifest: &Manifest, options: &ValidationOptions) -> Result<CheckResult> {
    let subject = manifest.id.to_string();

    let Some(block) = &manifest.signature else {
        return Ok(if options.require_signature {
            CheckResult::fail(CheckKind::Signature, subject, ReasonCode::MissingSignature)
        } else {
            CheckResult::new(CheckKind::Signature, subject, CheckStatus::Skipped, ReasonCode::Unsigned)
        });
    };

    let bytes = canonical::claim_bytes(&manifest.claim)?;
    let verification = verify_declared(&bytes, block);
    if let Some(failure) = verification.failure {
        return Ok(CheckResult::fail(CheckKind::Signature, subject, failure.into())
            .with_detail(failure.to_string()));
    }

    if !options.trusted_signers.is_empty()
        && !options
            .trusted_signers
            .iter()
            .any(|trusted| *trusted == block.public_key_fingerprint)
    {
        return Ok(
            CheckResult::fail(CheckKind::Signature, subject, ReasonCode::UntrustedSigner)
                .with_detail(format!("signer {} is not trusted", block.public_key_fingerprint)),
        );
    }

    Ok(CheckResult::pass(CheckKind::Signature, subject).with_detail(block.public_key_fingerprint.clone()))
}

fn check_ingredient(ingredient: &Ingredient) -> CheckResult {
    let subject = ingredient.name.clone();

    let Some(path) = ingredient.local_path() else {
        return CheckResult::new(
            CheckKind::Ingredient,
            subject,
            CheckStatus::Unavailable,
            ReasonCode::ArtifactUnavailable,
        )
        .with_detail("no local location recorded");
    };

    match hash_path(&path, ingredient.hash_algorithm) {
        Ok(digest) if digests_equal(&digest.value, &ingredient.hash) => {
            CheckResult::pass(CheckKind::Ingredient, subject)
        }
        Ok(digest) => CheckResult::fail(CheckKind::Ingredient, subject, ReasonCode::HashMismatch)
            .with_detail(format!(
                "{}: recorded {}, found {}",
                path.display(),
                ingredient.hash,
                digest.value
            )),
        Err(e) => {
            warn!(ingredient = %ingredient.name, error = %e, "Artifact unavailable for validation");
            CheckResult::new(
                CheckKind::Ingredient,
                subject,
                CheckStatus::Unavailable,
                ReasonCode::ArtifactUnavailable,
            )
            .with_detail(e.to_string())
        }
    }
}

fn check_link(target: &ManifestId, store: &dyn ManifestStore) -> Result<CheckResult> {
    let subject = target.to_string();
    match store.get(target) {
        Ok(_) => Ok(CheckResult::pass(CheckKind::LinkedManifest, subject)),
        Err(e) if e.is_not_found() => Ok(CheckResult::fail(
            CheckKind::LinkedManifest,
            subject,
            ReasonCode::UnknownManifest,
        )),
        Err(e) if e.class() == ErrorClass::Integrity || is_corrupt(&e) => Ok(CheckResult::fail(
            CheckKind::LinkedManifest,
            subject,
            ReasonCode::IntegrityViolation,
        )
        .with_detail(e.to_string())),
        Err(e) => Err(e),
    }
}

fn check_previous_version(
    manifest: &Manifest,
    previous: &ManifestId,
    store: &dyn ManifestStore,
) -> Result<CheckResult> {
    let subject = previous.to_string();
    let prior = match store.get(previous) {
        Ok(prior) => prior,
        Err(e) if e.is_not_found() => {
            return Ok(CheckResult::fail(
                CheckKind::PreviousVersion,
                subject,
                ReasonCode::UnknownManifest,
            ))
        }
        Err(e) if e.class() == ErrorClass::Integrity || is_corrupt(&e) => {
            return Ok(CheckResult::fail(
                CheckKind::PreviousVersion,
                subject,
                ReasonCode::IntegrityViolation,
            )
            .with_detail(e.to_string()))
        }
        Err(e) => return Err(e),
    };

    if prior.claim.ingredients != manifest.claim.ingredients {
        return Ok(CheckResult::fail(
            CheckKind::PreviousVersion,
            subject,
            ReasonCode::IngredientsChanged,
        ));
    }

    let removed: Vec<String> = prior
        .claim
        .linked_manifests
        .difference(&manifest.claim.linked_manifests)
        .map(ToString::to_string)
        .collect();
    if !removed.is_empty() {
        return Ok(
            CheckResult::fail(CheckKind::PreviousVersion, subject, ReasonCode::LinksRemoved)
                .with_detail(format!("dropped links: {}", removed.join(", "))),
        );
    }

    Ok(CheckResult::pass(CheckKind::PreviousVersion, subject))
}

fn is_corrupt(error: &Error) -> bool {
    matches!(error, Error::Storage(StorageError::Corrupt { .. }))
}

/// Result of validating every node reachable from a root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphValidation {
    pub graph: ProvenanceGraph,
    pub reports: BTreeMap<ManifestId, ValidationReport>,
}

impl GraphValidation {
    pub fn passed(&self) -> bool {
        self.reports.values().all(ValidationReport::passed)
    }
}

/// Transitive validation: export the graph, then validate each node.
pub fn validate_graph(
    root: &ManifestId,
    max_depth: usize,
    store: &dyn ManifestStore,
    options: &ValidationOptions,
) -> Result<GraphValidation> {
    let graph = export(root, max_depth, store)?;
    let mut reports = BTreeMap::new();
    for manifest in graph.nodes.values() {
        reports.insert(manifest.id.clone(), validate_manifest(manifest, store, options)?);
    }
    Ok(GraphValidation { graph, reports })
}

/// Outcome of [`verify_link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkVerification {
    pub valid: bool,
    pub reason: ReasonCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ErrorClass>,
}

impl LinkVerification {
    fn with(reason: ReasonCode) -> Self {
        Self {
            valid: reason == ReasonCode::Ok,
            reason,
            class: reason.class(),
        }
    }
}

/// True iff `target` is among `source`'s links and resolves in `store`.
///
/// Absent manifests are reported in the result; only backend failures are errors.
pub fn verify_link(
    source: &ManifestId,
    target: &ManifestId,
    store: &dyn ManifestStore,
) -> Result<LinkVerification> {
    let manifest = match store.get(source) {
        Ok(manifest) => manifest,
        Err(e) if e.is_not_found() => return Ok(LinkVerification::with(ReasonCode::UnknownManifest)),
        Err(e) if e.class() == ErrorClass::Integrity || is_corrupt(&e) => {
            return Ok(LinkVerification::with(ReasonCode::IntegrityViolation))
        }
        Err(e) => return Err(e),
    };

    if !manifest.claim.linked_manifests.contains(target) {
        return Ok(LinkVerification::with(ReasonCode::NotLinked));
    }

    if !store.exists(target)? {
        return Ok(LinkVerification::with(ReasonCode::UnknownManifest));
    }

    Ok(LinkVerification::with(ReasonCode::Ok))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build, seal, BuildRequest, IngredientSpec, ManifestMetadata};
    use crate::linker::{link, LinkOptions, LinkPolicy};
    use crate::model::ManifestKind;
    use crate::storage::test_support::manifest;
    use crate::storage::MemoryStore;
    use ed25519_dalek::SigningKey;
    use provgraph_crypto::{public_key_fingerprint, SigningSecret};
    use std::fs;

    fn status_of(report: &ValidationReport, check: CheckKind) -> Vec<(CheckStatus, ReasonCode)> {
        report
            .checks
            .iter()
            .filter(|c| c.check == check)
            .map(|c| (c.status, c.reason))
            .collect()
    }

    #[test]
    fn test_clean_manifest_passes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("train.csv");
        fs::write(&file, b"x,y\n").unwrap();

        let store = MemoryStore::new();
        let request = BuildRequest::new(ManifestKind::Dataset, ManifestMetadata::titled("d"))
            .ingredient(IngredientSpec::new("train", &file));
        let id = store.put(&build(request, None).unwrap()).unwrap();

        let report = validate(&id, &store, &ValidationOptions::default()).unwrap();
        assert!(report.passed());
        assert_eq!(
            status_of(&report, CheckKind::Signature),
            vec![(CheckStatus::Skipped, ReasonCode::Unsigned)]
        );
        assert_eq!(
            status_of(&report, CheckKind::Ingredient),
            vec![(CheckStatus::Pass, ReasonCode::Ok)]
        );
    }

    #[test]
    fn test_tampered_artifact_fails_and_checks_continue() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, b"1").unwrap();
        fs::write(&b, b"2").unwrap();

        let store = MemoryStore::new();
        let request = BuildRequest::new(ManifestKind::Dataset, ManifestMetadata::titled("d"))
            .ingredient(IngredientSpec::new("a", &a))
            .ingredient(IngredientSpec::new("b", &b));
        let id = store.put(&build(request, None).unwrap()).unwrap();

        fs::write(&a, b"9").unwrap();
        fs::remove_file(&b).unwrap();

        let report = validate(&id, &store, &ValidationOptions::default()).unwrap();
        assert!(!report.passed());
        assert_eq!(
            status_of(&report, CheckKind::Ingredient),
            vec![
                (CheckStatus::Fail, ReasonCode::HashMismatch),
                (CheckStatus::Unavailable, ReasonCode::ArtifactUnavailable)
            ]
        );
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_unknown_root_is_error() {
        let store = MemoryStore::new();
        let ghost = manifest("ghost", ManifestKind::Model).id;
        assert!(matches!(
            validate(&ghost, &store, &ValidationOptions::default()),
            Err(Error::UnknownManifest(_))
        ));
    }

    #[test]
    fn test_forged_id_reported() {
        let store = MemoryStore::new();
        let mut forged = manifest("a", ManifestKind::Dataset);
        forged.claim.title = "edited after sealing".to_string();
        store.seed(&forged).unwrap();

        let report = validate(&forged.id, &store, &ValidationOptions::default()).unwrap();
        assert_eq!(
            status_of(&report, CheckKind::ContentAddress),
            vec![(CheckStatus::Fail, ReasonCode::IdMismatch)]
        );
    }

    #[test]
    fn test_signature_checks() {
        let store = MemoryStore::new();
        let key = SigningKey::from_bytes(&[5; 32]);
        let secret = SigningSecret::from_signing_key(&key);
        let signed = seal(manifest("signed", ManifestKind::Model).claim, Some(&secret)).unwrap();
        let unsigned = manifest("unsigned", ManifestKind::Model);
        store.put(&signed).unwrap();
        store.put(&unsigned).unwrap();

        let strict = ValidationOptions {
            require_signature: true,
            trusted_signers: vec![public_key_fingerprint(&key.verifying_key())],
        };
        assert!(validate(&signed.id, &store, &strict).unwrap().passed());

        let report = validate(&unsigned.id, &store, &strict).unwrap();
        assert_eq!(
            status_of(&report, CheckKind::Signature),
            vec![(CheckStatus::Fail, ReasonCode::MissingSignature)]
        );

        let other = ValidationOptions {
            require_signature: true,
            trusted_signers: vec!["did:key:z6MkSomeoneElse".to_string()],
        };
        let report = validate(&signed.id, &store, &other).unwrap();
        assert_eq!(
            status_of(&report, CheckKind::Signature),
            vec![(CheckStatus::Fail, ReasonCode::UntrustedSigner)]
        );
    }

    #[test]
    fn test_signature_over_edited_claim_fails() {
        let store = MemoryStore::new();
        let secret = SigningSecret::from_signing_key(&SigningKey::from_bytes(&[5; 32]));
        let mut signed = seal(manifest("m", ManifestKind::Model).claim, Some(&secret)).unwrap();

        // Re-seal an edited claim but keep the old signature
        let block = signed.signature.take();
        signed.claim.title = "edited".to_string();
        let mut resealed = seal(signed.claim, None).unwrap();
        resealed.signature = block;
        store.put(&resealed).unwrap();

        let report = validate(&resealed.id, &store, &ValidationOptions::default()).unwrap();
        assert_eq!(
            status_of(&report, CheckKind::Signature),
            vec![(CheckStatus::Fail, ReasonCode::SignatureMismatch)]
        );
        assert_eq!(report.checks[1].class, Some(ErrorClass::Integrity));
    }

    #[test]
    fn test_dangling_link_and_previous_version() {
        let store = MemoryStore::new();
        let model = store.put(&manifest("model", ManifestKind::Model)).unwrap();
        let pending = manifest("pending", ManifestKind::Dataset);
        let options = LinkOptions {
            policy: LinkPolicy::Lenient,
            signer: None,
        };
        let v2 = link(&model, &pending.id, &store, &options).unwrap();

        let report = validate(&v2, &store, &ValidationOptions::default()).unwrap();
        assert!(!report.passed());
        assert_eq!(
            status_of(&report, CheckKind::LinkedManifest),
            vec![(CheckStatus::Fail, ReasonCode::UnknownManifest)]
        );
        assert_eq!(
            status_of(&report, CheckKind::PreviousVersion),
            vec![(CheckStatus::Pass, ReasonCode::Ok)]
        );

        // Once the target lands the same version validates
        store.put(&pending).unwrap();
        assert!(validate(&v2, &store, &ValidationOptions::default()).unwrap().passed());
    }

    #[test]
    fn test_previous_version_invariants() {
        let store = MemoryStore::new();
        let data = store.put(&manifest("data", ManifestKind::Dataset)).unwrap();
        let v1 = manifest("model", ManifestKind::Model);
        store.put(&v1).unwrap();
        let v2 = link(&v1.id, &data, &store, &LinkOptions::default()).unwrap();

        // A "successor" of v2 that drops the link
        let mut dropped = store.get(&v2).unwrap().claim;
        dropped.linked_manifests.clear();
        dropped.previous_version = Some(v2.clone());
        let dropped = store.put(&seal(dropped, None).unwrap()).unwrap();

        let report = validate(&dropped, &store, &ValidationOptions::default()).unwrap();
        assert_eq!(
            status_of(&report, CheckKind::PreviousVersion),
            vec![(CheckStatus::Fail, ReasonCode::LinksRemoved)]
        );

        // A "successor" with different ingredients
        let mut swapped = manifest("other", ManifestKind::Model).claim;
        swapped.previous_version = Some(v1.id.clone());
        let swapped = store.put(&seal(swapped, None).unwrap()).unwrap();

        let report = validate(&swapped, &store, &ValidationOptions::default()).unwrap();
        assert_eq!(
            status_of(&report, CheckKind::PreviousVersion),
            vec![(CheckStatus::Fail, ReasonCode::IngredientsChanged)]
        );
    }

    #[test]
    fn test_verify_link_outcomes() {
        let store = MemoryStore::new();
        let model = store.put(&manifest("model", ManifestKind::Model)).unwrap();
        let data = store.put(&manifest("data", ManifestKind::Dataset)).unwrap();
        let ghost = manifest("ghost", ManifestKind::Dataset).id;
        let v2 = link(&model, &data, &store, &LinkOptions::default()).unwrap();

        assert!(verify_link(&v2, &data, &store).unwrap().valid);

        let not_linked = verify_link(&model, &data, &store).unwrap();
        assert!(!not_linked.valid);
        assert_eq!(not_linked.reason, ReasonCode::NotLinked);

        let lenient = LinkOptions {
            policy: LinkPolicy::Lenient,
            signer: None,
        };
        let v3 = link(&v2, &ghost, &store, &lenient).unwrap();
        let missing = verify_link(&v3, &ghost, &store).unwrap();
        assert!(!missing.valid);
        assert_eq!(missing.reason, ReasonCode::UnknownManifest);
        assert_eq!(missing.class, Some(ErrorClass::Reference));

        let no_source = verify_link(&ghost, &data, &store).unwrap();
        assert_eq!(no_source.reason, ReasonCode::UnknownManifest);
    }

    #[test]
    fn test_report_serializes_with_codes() {
        let store = MemoryStore::new();
        let id = store.put(&manifest("m", ManifestKind::Model)).unwrap();
        let report = validate(&id, &store, &ValidationOptions::default()).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["checks"][0]["check"], "content-address");
        assert_eq!(json["checks"][0]["status"], "pass");
        assert_eq!(json["checks"][1]["reason"], "UNSIGNED");
    }
}
