// Manifest signing
//
// The signature covers exactly the canonical bytes that the manifest id is
// derived from. The signing key exists only inside this call.

use ed25519_dalek::Signer;

use crate::error::CryptoError;
use crate::keys::SigningSecret;
use crate::types::{SignatureAlgorithm, SignatureBlock};

/// Signs canonical manifest bytes and returns the detached signature block.
///
/// Malformed key material fails with [`CryptoError::InvalidKeyFormat`]. The
/// materialized key is dropped, and therefore zeroized, on every return path.
pub fn sign(canonical_bytes: &[u8], secret: &SigningSecret) -> Result<SignatureBlock, CryptoError> {
    let signing_key = secret.signing_key()?;
    let signature = signing_key.sign(canonical_bytes);
    drop(signing_key);

    Ok(SignatureBlock {
        algorithm: SignatureAlgorithm::Ed25519,
        public_key_fingerprint: secret.fingerprint(),
        signature_bytes: signature.to_bytes().to_vec(),
    })
}
