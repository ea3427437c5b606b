// Key material handling for manifest signing
//
// Private key bytes live in a `Zeroizing` buffer owned by `SigningSecret`.
// The Ed25519 `SigningKey` is only materialized for the duration of a
// signing call and is wiped on drop by ed25519-dalek.

use std::fmt;
use std::fs;
use std::path::Path;

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::fingerprint::{key_from_fingerprint, public_key_fingerprint};

const PEM_MARKER: &str = "-----BEGIN";

/// Generates a new Ed25519 keypair using secure random bytes from the OS.
pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key)
}

/// Encodes a signing key as PKCS#8 PEM. The returned string is wiped on drop.
pub fn signing_key_to_pem(signing_key: &SigningKey) -> Result<Zeroizing<String>, CryptoError> {
    signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("PKCS#8 encoding failed: {}", e)))
}

/// Encodes a public key as SPKI PEM.
pub fn verifying_key_to_pem(verifying_key: &VerifyingKey) -> Result<String, CryptoError> {
    verifying_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("SPKI encoding failed: {}", e)))
}

/// Parses a public key given as a did:key fingerprint, SPKI PEM or 64 hex characters.
pub fn parse_public_key(text: &str) -> Result<VerifyingKey, CryptoError> {
    let text = text.trim();

    if text.starts_with("did:") {
        return key_from_fingerprint(text);
    }

    if text.starts_with(PEM_MARKER) {
        return VerifyingKey::from_public_key_pem(text)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid public key PEM: {}", e)));
    }

    let mut bytes = [0u8; 32];
    hex::decode_to_slice(text, &mut bytes).map_err(|_| {
        CryptoError::InvalidKeyFormat(
            "expected did:key, SPKI PEM or 64 hex characters".to_string(),
        )
    })?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("not a valid Ed25519 point: {}", e)))
}

/// Private key material accepted for signing: PKCS#8 PEM, a 32-byte seed as
/// 64 hex characters, or the raw 32-byte seed.
pub struct SigningSecret {
    material: Zeroizing<Vec<u8>>,
    verifying_key: VerifyingKey,
}

impl SigningSecret {
    /// Takes ownership of key material and checks that it decodes.
    pub fn from_bytes(material: Zeroizing<Vec<u8>>) -> Result<Self, CryptoError> {
        let verifying_key = decode_signing_key(&material)?.verifying_key();
        Ok(Self {
            material,
            verifying_key,
        })
    }

    /// Reads key material from disk.
    pub fn from_file(path: &Path) -> Result<Self, CryptoError> {
        let material = Zeroizing::new(fs::read(path).map_err(|source| {
            CryptoError::KeyUnreadable {
                path: path.to_path_buf(),
                source,
            }
        })?);
        Self::from_bytes(material)
    }

    /// Wraps an in-memory signing key, keeping only its seed.
    pub fn from_signing_key(signing_key: &SigningKey) -> Self {
        Self {
            material: Zeroizing::new(signing_key.as_bytes().to_vec()),
            verifying_key: signing_key.verifying_key(),
        }
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// did:key fingerprint of the public half.
    pub fn fingerprint(&self) -> String {
        public_key_fingerprint(&self.verifying_key)
    }

    /// Materializes the signing key. Callers must keep it scoped to one operation.
    pub(crate) fn signing_key(&self) -> Result<SigningKey, CryptoError> {
        decode_signing_key(&self.material)
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSecret")
            .field("material", &"<redacted>")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

fn decode_signing_key(material: &[u8]) -> Result<SigningKey, CryptoError> {
    if let Ok(text) = std::str::from_utf8(material) {
        let trimmed = text.trim();

        if trimmed.starts_with(PEM_MARKER) {
            return SigningKey::from_pkcs8_pem(trimmed).map_err(|e| {
                CryptoError::InvalidKeyFormat(format!("invalid PKCS#8 private key: {}", e))
            });
        }

        if trimmed.len() == 64 {
            let mut seed = Zeroizing::new([0u8; 32]);
            if hex::decode_to_slice(trimmed, &mut seed[..]).is_ok() {
                return Ok(SigningKey::from_bytes(&seed));
            }
        }
    }

    if let Ok(seed) = <&[u8; 32]>::try_from(material) {
        return Ok(SigningKey::from_bytes(seed));
    }

    Err(CryptoError::InvalidKeyFormat(
        "expected PKCS#8 PEM, a 64-character hex seed or 32 raw bytes".to_string(),
    ))
}
