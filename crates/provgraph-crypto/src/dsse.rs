//! DSSE (Dead Simple Signing Envelope) v1.
//!
//! Signatures cover the pre-authentication encoding of the payload type and
//! payload, never the raw payload. Each signature's `keyid` is the signer's
//! did:key, so an envelope verifies without out-of-band key distribution.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::keys::SigningSecret;
use crate::sign::sign;
use crate::types::{base64_bytes, SignatureAlgorithm, SignatureBlock, Verification, VerifyFailure};
use crate::verify::verify_declared;

/// Payload type of an in-toto Statement.
pub const IN_TOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// `PAE(type, body) = "DSSEv1" SP LEN(type) SP type SP LEN(body) SP body`
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "DSSEv1 {} {} {} ",
        payload_type.len(),
        payload_type,
        payload.len()
    );
    let mut encoded = Vec::with_capacity(header.len() + payload.len());
    encoded.extend_from_slice(header.as_bytes());
    encoded.extend_from_slice(payload);
    encoded
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    #[serde(default)]
    pub keyid: String,
    #[serde(with = "base64_bytes")]
    pub sig: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub payload_type: String,
    pub signatures: Vec<EnvelopeSignature>,
}

impl Envelope {
    /// Wraps `payload` and signs it once with `secret`.
    pub fn sign(
        payload: Vec<u8>,
        payload_type: &str,
        secret: &SigningSecret,
    ) -> Result<Self, CryptoError> {
        let mut envelope = Self {
            payload,
            payload_type: payload_type.to_string(),
            signatures: Vec::new(),
        };
        envelope.add_signature(secret)?;
        Ok(envelope)
    }

    /// Adds a co-signature over the same pre-authentication encoding.
    pub fn add_signature(&mut self, secret: &SigningSecret) -> Result<(), CryptoError> {
        let block = sign(&pae(&self.payload_type, &self.payload), secret)?;
        self.signatures.push(EnvelopeSignature {
            keyid: block.public_key_fingerprint,
            sig: block.signature_bytes,
        });
        Ok(())
    }

    /// Valid when there is at least one signature and every one verifies
    /// against the key its `keyid` declares.
    pub fn verify(&self) -> Verification {
        if self.signatures.is_empty() {
            return Verification::failed(VerifyFailure::MalformedSignature);
        }
        let message = pae(&self.payload_type, &self.payload);
        for signature in &self.signatures {
            let block = SignatureBlock {
                algorithm: SignatureAlgorithm::Ed25519,
                public_key_fingerprint: signature.keyid.clone(),
                signature_bytes: signature.sig.clone(),
            };
            let outcome = verify_declared(&message, &block);
            if !outcome.valid {
                return outcome;
            }
        }
        Verification::ok()
    }

    /// did:key of every signer, in signature order.
    pub fn signers(&self) -> impl Iterator<Item = &str> {
        self.signatures.iter().map(|s| s.keyid.as_str())
    }
}
