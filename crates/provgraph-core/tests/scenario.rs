//! End-to-end provenance workflow against the on-disk backends.

use std::fs;
use std::path::Path;

use ed25519_dalek::SigningKey;
use provgraph_core::storage::{FilesystemStore, TransparencyLogStore};
use provgraph_core::{
    build, link, validate, validate_graph, verify_link, BuildRequest, CheckKind, CheckStatus,
    IngredientSpec, LinkOptions, LinkPolicy, ManifestKind, ManifestMetadata, ManifestStore,
    ReasonCode, SigningSecret, ValidationOptions,
};

fn signer() -> SigningSecret {
    SigningSecret::from_signing_key(&SigningKey::from_bytes(&[42; 32]))
}

fn run_scenario(store: &dyn ManifestStore, artifacts: &Path) {
    let train = artifacts.join("train.csv");
    let model_file = artifacts.join("model.onnx");
    fs::write(&train, b"feature,label\n0.1,1\n0.7,0\n").unwrap();
    fs::write(&model_file, b"\x08\x07onnx-weights").unwrap();

    let secret = signer();

    let dataset = build(
        BuildRequest::new(ManifestKind::Dataset, ManifestMetadata::titled("training data"))
            .ingredient(IngredientSpec::new("train.csv", &train)),
        Some(&secret),
    )
    .unwrap();
    let d = store.put(&dataset).unwrap();

    let model = build(
        BuildRequest::new(ManifestKind::Model, ManifestMetadata::titled("classifier"))
            .ingredient(IngredientSpec::new("model.onnx", &model_file)),
        Some(&secret),
    )
    .unwrap();
    let m = store.put(&model).unwrap();

    let options = LinkOptions {
        policy: LinkPolicy::Strict,
        signer: Some(&secret),
    };
    let m2 = link(&m, &d, store, &options).unwrap();
    assert_ne!(m2, m);
    assert!(verify_link(&m2, &d, store).unwrap().valid);

    let strict = ValidationOptions {
        require_signature: true,
        trusted_signers: vec![secret.fingerprint()],
    };
    let report = validate(&m2, store, &strict).unwrap();
    assert!(report.passed(), "{:?}", report);
    assert_eq!(report.count(CheckStatus::Fail), 0);

    // Tamper with the dataset artifact
    fs::write(&train, b"feature,label\n0.1,0\n0.7,0\n").unwrap();

    // Non-transitive: M' only checks its own ingredients and that D resolves
    let report = validate(&m2, store, &strict).unwrap();
    assert!(report.passed());

    let report = validate(&d, store, &strict).unwrap();
    assert!(!report.passed());
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].check, CheckKind::Ingredient);
    assert_eq!(failures[0].reason, ReasonCode::HashMismatch);

    // Transitive: the graph fails, and only on D
    let graph = validate_graph(&m2, 5, store, &strict).unwrap();
    assert!(!graph.passed());
    assert_eq!(graph.reports.len(), 2);
    assert!(graph.reports[&m2].passed());
    assert!(!graph.reports[&d].passed());
}

#[test]
fn test_scenario_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = tempfile::tempdir().unwrap();
    let store = FilesystemStore::open(dir.path()).unwrap();
    run_scenario(&store, artifacts.path());
}

#[test]
fn test_scenario_transparency_log() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = tempfile::tempdir().unwrap();
    let store = TransparencyLogStore::open(dir.path()).unwrap();
    run_scenario(&store, artifacts.path());

    let checkpoint = store.checkpoint().unwrap().unwrap();
    // dataset, model, linked model
    assert_eq!(checkpoint.tree_size, 3);
}

#[test]
fn test_scenario_through_config() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = tempfile::tempdir().unwrap();
    let location = format!("file://{}", dir.path().display());
    let config = provgraph_core::StorageConfig::from_parts("local-fs", Some(&location)).unwrap();
    let store = provgraph_core::open(&config).unwrap();
    run_scenario(store.as_ref(), artifacts.path());
}
