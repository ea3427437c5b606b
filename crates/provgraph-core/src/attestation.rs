//! in-toto attestations of manifests.
//!
//! A manifest becomes the predicate of an in-toto Statement v1 whose subjects
//! are its ingredients. Signed statements travel in a DSSE envelope; the
//! manifest inside still carries its own content address, which is checked
//! whenever an envelope is opened.

use std::collections::BTreeMap;

use provgraph_crypto::{jcs_canonical_bytes, Envelope, SigningSecret, Verification, IN_TOTO_PAYLOAD_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::Manifest;

pub const STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v1";

/// Predicate type identifying a provgraph manifest.
pub const MANIFEST_PREDICATE_TYPE: &str = "urn:provgraph:predicate:manifest:v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    /// Algorithm name to hex digest
    pub digest: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    #[serde(rename = "_type")]
    pub statement_type: String,
    pub subject: Vec<ResourceDescriptor>,
    pub predicate_type: String,
    pub predicate: Manifest,
}

impl Statement {
    pub fn for_manifest(manifest: &Manifest) -> Self {
        Self {
            statement_type: STATEMENT_TYPE.to_string(),
            subject: subjects(manifest),
            predicate_type: MANIFEST_PREDICATE_TYPE.to_string(),
            predicate: manifest.clone(),
        }
    }

    /// Returns the manifest after checking the statement and predicate types,
    /// the manifest's content address, and that the subjects are exactly its
    /// ingredients.
    pub fn into_manifest(self) -> Result<Manifest> {
        if self.statement_type != STATEMENT_TYPE {
            return Err(Error::Encoding(format!(
                "unsupported statement type '{}'",
                self.statement_type
            )));
        }
        if self.predicate_type != MANIFEST_PREDICATE_TYPE {
            return Err(Error::Encoding(format!(
                "unsupported predicate type '{}'",
                self.predicate_type
            )));
        }
        self.predicate.check_id()?;
        if self.subject != subjects(&self.predicate) {
            return Err(Error::Encoding(format!(
                "statement subjects do not match the ingredients of {}",
                self.predicate.id
            )));
        }
        Ok(self.predicate)
    }
}

fn subjects(manifest: &Manifest) -> Vec<ResourceDescriptor> {
    manifest
        .claim
        .ingredients
        .iter()
        .map(|ingredient| ResourceDescriptor {
            name: ingredient.name.clone(),
            digest: BTreeMap::from([(
                ingredient.hash_algorithm.as_str().to_string(),
                ingredient.hash.clone(),
            )]),
        })
        .collect()
}

/// A manifest recovered from an envelope, with the envelope's signature outcome.
#[derive(Debug, Clone)]
pub struct Attestation {
    pub manifest: Manifest,
    pub verification: Verification,
    pub signers: Vec<String>,
}

/// Wraps the manifest's statement (canonical JSON) in a signed DSSE envelope.
pub fn sign_statement(manifest: &Manifest, signer: &SigningSecret) -> Result<Envelope> {
    let payload = jcs_canonical_bytes(&Statement::for_manifest(manifest))?;
    let envelope = Envelope::sign(payload, IN_TOTO_PAYLOAD_TYPE, signer)?;
    debug!(id = %manifest.id, signer = %signer.fingerprint(), "Signed in-toto statement");
    Ok(envelope)
}

/// Decodes an envelope's statement. A bad signature is reported in the
/// result; a payload that is not a well-formed manifest statement is an error.
pub fn open_envelope(envelope: &Envelope) -> Result<Attestation> {
    if envelope.payload_type != IN_TOTO_PAYLOAD_TYPE {
        return Err(Error::Encoding(format!(
            "unsupported payload type '{}'",
            envelope.payload_type
        )));
    }
    let statement: Statement = serde_json::from_slice(&envelope.payload)
        .map_err(|e| Error::Encoding(format!("payload is not an in-toto statement: {}", e)))?;

    Ok(Attestation {
        manifest: statement.into_manifest()?,
        verification: envelope.verify(),
        signers: envelope.signers().map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ManifestKind;
    use crate::storage::test_support::manifest;
    use ed25519_dalek::SigningKey;
    use provgraph_crypto::VerifyFailure;

    fn signer() -> SigningSecret {
        SigningSecret::from_signing_key(&SigningKey::from_bytes(&[11; 32]))
    }

    #[test]
    fn test_statement_shape() {
        let m = manifest("weights", ManifestKind::Model);
        let json = serde_json::to_value(Statement::for_manifest(&m)).unwrap();

        assert_eq!(json["_type"], STATEMENT_TYPE);
        assert_eq!(json["predicateType"], MANIFEST_PREDICATE_TYPE);
        assert_eq!(json["subject"][0]["name"], "weights.bin");
        assert_eq!(
            json["subject"][0]["digest"]["sha256"],
            m.claim.ingredients[0].hash.as_str()
        );
        assert_eq!(json["predicate"]["id"], m.id.as_str());
    }

    #[test]
    fn test_envelope_opens_to_same_manifest() {
        let m = manifest("data", ManifestKind::Dataset);
        let secret = signer();
        let envelope = sign_statement(&m, &secret).unwrap();

        let opened = open_envelope(&envelope).unwrap();
        assert_eq!(opened.manifest, m);
        assert!(opened.verification.valid);
        assert_eq!(opened.signers, vec![secret.fingerprint()]);
    }

    #[test]
    fn test_resigned_payload_edit_is_caught_by_content_address() {
        let m = manifest("data", ManifestKind::Dataset);
        let mut statement = Statement::for_manifest(&m);
        statement.predicate.claim.title = "edited".to_string();
        let payload = serde_json::to_vec(&statement).unwrap();
        let envelope = Envelope::sign(payload, IN_TOTO_PAYLOAD_TYPE, &signer()).unwrap();

        assert!(matches!(open_envelope(&envelope), Err(Error::IdMismatch { .. })));
    }

    #[test]
    fn test_swapped_subject_rejected() {
        let m = manifest("data", ManifestKind::Dataset);
        let mut statement = Statement::for_manifest(&m);
        statement.subject[0].name = "other.bin".to_string();
        assert!(matches!(statement.into_manifest(), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_tampered_envelope_reports_signature_failure() {
        let m = manifest("data", ManifestKind::Dataset);
        let mut envelope = sign_statement(&m, &signer()).unwrap();
        envelope.signatures[0].sig[0] ^= 0x01;

        let opened = open_envelope(&envelope).unwrap();
        assert!(!opened.verification.valid);
        assert_eq!(opened.verification.failure, Some(VerifyFailure::SignatureMismatch));
    }

    #[test]
    fn test_wrong_payload_type_rejected() {
        let m = manifest("data", ManifestKind::Dataset);
        let mut envelope = sign_statement(&m, &signer()).unwrap();
        envelope.payload_type = "application/json".to_string();
        assert!(matches!(open_envelope(&envelope), Err(Error::Encoding(_))));
    }
}
