//! Engine-level properties: content addressing, idempotent storage, tamper
//! detection, link monotonicity and bounded traversal.

use std::fs;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use provgraph_core::storage::{FilesystemStore, MemoryStore, TransparencyLogStore};
use provgraph_core::{
    build, content_id, export, link, seal, validate, verify_link, BuildRequest, CheckKind,
    CheckStatus, Claim, ErrorClass, HashAlgorithm, Ingredient, IngredientSpec, LinkOptions,
    LinkPolicy, Manifest, ManifestId, ManifestKind, ManifestMetadata, ManifestStore, ReasonCode,
    ValidationOptions,
};

fn claim(title: &str, kind: ManifestKind, hashes: &[String]) -> Claim {
    Claim {
        title: title.to_string(),
        author_org: Some("lab".to_string()),
        author_name: None,
        description: None,
        kind,
        ingredients: hashes
            .iter()
            .enumerate()
            .map(|(i, hash)| Ingredient {
                name: format!("part-{}", i),
                hash: hash.clone(),
                hash_algorithm: HashAlgorithm::Sha256,
                media_type: "application/octet-stream".to_string(),
                size: 1,
                location: None,
            })
            .collect(),
        linked_manifests: Default::default(),
        previous_version: None,
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        annotations: None,
    }
}

fn sealed(title: &str, kind: ManifestKind) -> Manifest {
    seal(claim(title, kind, &[hex_sha256(title.as_bytes())]), None).unwrap()
}

fn hex_sha256(bytes: &[u8]) -> String {
    provgraph_crypto::hash_bytes(bytes, HashAlgorithm::Sha256)
}

/// Rewrites every JSON object with its keys in reverse order.
fn reorder(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let fields: Vec<String> = map
                .into_iter()
                .rev()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(&k).unwrap(), reorder(v)))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let items: Vec<String> = items.into_iter().map(reorder).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

proptest! {
    /// Field order of the serialized claim never affects the id
    #[test]
    fn prop_id_independent_of_field_order(
        title in "[a-zA-Z0-9 ]{1,24}",
        hashes in prop::collection::vec("[0-9a-f]{64}", 1..5),
    ) {
        let original = claim(&title, ManifestKind::Dataset, &hashes);
        let reordered: Claim =
            serde_json::from_str(&reorder(serde_json::to_value(&original).unwrap())).unwrap();

        prop_assert_eq!(content_id(&original).unwrap(), content_id(&reordered).unwrap());
    }

    /// Changing any single nibble of any ingredient hash changes the id
    #[test]
    fn prop_ingredient_mutation_changes_id(
        hashes in prop::collection::vec("[0-9a-f]{64}", 1..4),
        which in any::<prop::sample::Index>(),
        position in 0usize..64,
    ) {
        let original = claim("artifact", ManifestKind::Model, &hashes);
        let mut mutated = original.clone();

        let target = which.index(mutated.ingredients.len());
        let mut chars: Vec<char> = mutated.ingredients[target].hash.chars().collect();
        chars[position] = if chars[position] == '0' { '1' } else { '0' };
        mutated.ingredients[target].hash = chars.into_iter().collect();

        prop_assert_ne!(content_id(&original).unwrap(), content_id(&mutated).unwrap());
    }
}

#[test]
fn test_idempotent_put_every_backend() {
    let fs_dir = tempfile::tempdir().unwrap();
    let log_dir = tempfile::tempdir().unwrap();
    let stores: Vec<Box<dyn ManifestStore>> = vec![
        Box::new(MemoryStore::new()),
        Box::new(FilesystemStore::open(fs_dir.path()).unwrap()),
        Box::new(TransparencyLogStore::open(log_dir.path()).unwrap()),
    ];

    let manifest = sealed("twice", ManifestKind::Software);
    for store in &stores {
        let first = store.put(&manifest).unwrap();
        let bytes = store.get_encoded(&first).unwrap();
        let second = store.put(&manifest).unwrap();

        assert_eq!(first, second, "{}", store.describe());
        assert_eq!(store.get_encoded(&second).unwrap(), bytes);
        assert_eq!(store.get(&first).unwrap(), manifest);
        assert_eq!(store.list(&Default::default()).unwrap(), vec![first]);
    }
}

#[test]
fn test_tamper_detection() {
    let artifacts = tempfile::tempdir().unwrap();
    let file = artifacts.path().join("F.bin");
    fs::write(&file, vec![7u8; 4096]).unwrap();

    let store = MemoryStore::new();
    let manifest = build(
        BuildRequest::new(ManifestKind::Dataset, ManifestMetadata::titled("F"))
            .ingredient(IngredientSpec::new("F", &file)),
        None,
    )
    .unwrap();
    let id = store.put(&manifest).unwrap();
    assert!(validate(&id, &store, &ValidationOptions::default()).unwrap().passed());

    let mut bytes = fs::read(&file).unwrap();
    bytes[2048] ^= 0x01;
    fs::write(&file, bytes).unwrap();

    let report = validate(&id, &store, &ValidationOptions::default()).unwrap();
    assert!(!report.passed());
    let ingredient = report
        .checks
        .iter()
        .find(|c| c.check == CheckKind::Ingredient)
        .unwrap();
    assert_eq!(ingredient.status, CheckStatus::Fail);
    assert_eq!(ingredient.reason, ReasonCode::HashMismatch);
}

#[test]
fn test_link_monotonicity() {
    let store = MemoryStore::new();
    let x = store.put(&sealed("x", ManifestKind::Model)).unwrap();
    let targets: Vec<ManifestId> = ["y1", "y2", "y3"]
        .iter()
        .map(|t| store.put(&sealed(t, ManifestKind::Dataset)).unwrap())
        .collect();

    let mut current = x;
    for target in &targets {
        let before = store.get(&current).unwrap();
        let next = link(&current, target, &store, &LinkOptions::default()).unwrap();
        let after = store.get(&next).unwrap();

        assert!(after.claim.linked_manifests.is_superset(&before.claim.linked_manifests));
        assert!(after.claim.linked_manifests.contains(target));
        assert_eq!(after.claim.previous_version.as_ref(), Some(&current));
        // The old version is still retrievable unchanged
        assert_eq!(store.get(&current).unwrap(), before);
        current = next;
    }
    assert_eq!(store.get(&current).unwrap().claim.linked_manifests.len(), 3);
}

#[test]
fn test_cycle_safety() {
    let store = MemoryStore::new();
    let mut a = sealed("a", ManifestKind::Model);
    let mut b = sealed("b", ManifestKind::Dataset);
    a.claim.linked_manifests.insert(b.id.clone());
    b.claim.linked_manifests.insert(a.id.clone());
    store.seed(&a).unwrap();
    store.seed(&b).unwrap();

    let graph = export(&a.id, 10, &store).unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert!(graph.nodes.contains_key(&a.id));
    assert!(graph.nodes.contains_key(&b.id));
    assert!(!graph.truncated);
}

#[test]
fn test_depth_truncation_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemStore::open(dir.path()).unwrap();

    let mut next: Option<ManifestId> = None;
    let mut root = None;
    for i in (0..20).rev() {
        let mut claim = sealed(&format!("hop-{}", i), ManifestKind::Model).claim;
        if let Some(target) = next.take() {
            claim.linked_manifests.insert(target);
        }
        let id = store.put(&seal(claim, None).unwrap()).unwrap();
        next = Some(id.clone());
        root = Some(id);
    }

    let graph = export(&root.unwrap(), 5, &store).unwrap();
    assert_eq!(graph.nodes.len(), 6);
    assert!(graph.truncated);
}

#[test]
fn test_invalid_link_detection() {
    let store = MemoryStore::new();
    let s = store.put(&sealed("s", ManifestKind::Model)).unwrap();
    let t = sealed("t", ManifestKind::Dataset).id;

    let lenient = LinkOptions {
        policy: LinkPolicy::Lenient,
        signer: None,
    };
    let s2 = link(&s, &t, &store, &lenient).unwrap();

    for source in [&s, &s2] {
        let outcome = verify_link(source, &t, &store).unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.class, Some(ErrorClass::Reference));
    }
}
