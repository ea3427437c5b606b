//! Type definitions for manifest signatures.
//!
//! A [`SignatureBlock`] travels with a manifest but is never part of the bytes
//! it signs. The signed bytes are the RFC 8785 canonical form of the claim.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Signature algorithms understood by the verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    #[default]
    Ed25519,
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureAlgorithm::Ed25519 => f.write_str("ed25519"),
        }
    }
}

/// Detached signature over a manifest's canonical claim bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureBlock {
    pub algorithm: SignatureAlgorithm,

    /// did:key of the signer; the public key is recoverable from it
    pub public_key_fingerprint: String,

    /// Raw signature, base64 encoded on the wire
    #[serde(with = "base64_bytes")]
    pub signature_bytes: Vec<u8>,
}

/// Outcome of a verification. Failing verification is a result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
    pub failure: Option<VerifyFailure>,
}

impl Verification {
    pub fn ok() -> Self {
        Self {
            valid: true,
            failure: None,
        }
    }

    pub fn failed(reason: VerifyFailure) -> Self {
        Self {
            valid: false,
            failure: Some(reason),
        }
    }
}

/// Why a signature did not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyFailure {
    /// Well-formed signature that does not match the bytes and key
    SignatureMismatch,
    /// Signature is not 64 bytes
    MalformedSignature,
    /// Verifying key differs from the key declared in the block
    FingerprintMismatch,
    /// Declared fingerprint does not decode to an Ed25519 key
    InvalidKeyFormat,
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            VerifyFailure::SignatureMismatch => "signature does not match canonical bytes",
            VerifyFailure::MalformedSignature => "signature is malformed",
            VerifyFailure::FingerprintMismatch => "verifying key does not match declared fingerprint",
            VerifyFailure::InvalidKeyFormat => "declared public key is not a valid Ed25519 did:key",
        };
        f.write_str(text)
    }
}

pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
