// Signature verification for manifest signature blocks
//
// Verification never errors: a bad signature is an answer, reported with
// the reason it failed.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::fingerprint::{key_from_fingerprint, public_key_fingerprint};
use crate::types::{SignatureAlgorithm, SignatureBlock, Verification, VerifyFailure};

/// Verifies `block` over `canonical_bytes` using the supplied public key.
///
/// The key must be the one the block declares; a block claiming a different
/// signer fails with [`VerifyFailure::FingerprintMismatch`] even if the
/// signature itself would check out.
pub fn verify(
    canonical_bytes: &[u8],
    block: &SignatureBlock,
    verifying_key: &VerifyingKey,
) -> Verification {
    match block.algorithm {
        SignatureAlgorithm::Ed25519 => {}
    }

    if public_key_fingerprint(verifying_key) != block.public_key_fingerprint {
        return Verification::failed(VerifyFailure::FingerprintMismatch);
    }

    let signature_array: [u8; 64] = match block.signature_bytes.as_slice().try_into() {
        Ok(bytes) => bytes,
        Err(_) => return Verification::failed(VerifyFailure::MalformedSignature),
    };
    let signature = Signature::from_bytes(&signature_array);

    match verifying_key.verify(canonical_bytes, &signature) {
        Ok(()) => Verification::ok(),
        Err(_) => Verification::failed(VerifyFailure::SignatureMismatch),
    }
}

/// Verifies `block` against the public key embedded in its own fingerprint.
pub fn verify_declared(canonical_bytes: &[u8], block: &SignatureBlock) -> Verification {
    match key_from_fingerprint(&block.public_key_fingerprint) {
        Ok(verifying_key) => verify(canonical_bytes, block, &verifying_key),
        Err(_) => Verification::failed(VerifyFailure::InvalidKeyFormat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SigningSecret;
    use crate::sign::sign;
    use ed25519_dalek::SigningKey;

    fn signed(bytes: &[u8]) -> (VerifyingKey, SignatureBlock) {
        let signing_key = SigningKey::from_bytes(&[0x42; 32]);
        let secret = SigningSecret::from_signing_key(&signing_key);
        let block = sign(bytes, &secret).expect("signing should succeed");
        (signing_key.verifying_key(), block)
    }

    #[test]
    fn test_verify_valid_signature() {
        let (verifying_key, block) = signed(b"canonical claim");

        assert_eq!(verify(b"canonical claim", &block, &verifying_key), Verification::ok());
        assert!(verify_declared(b"canonical claim", &block).valid);
    }

    #[test]
    fn test_verify_fails_on_wrong_content() {
        let (verifying_key, block) = signed(b"canonical claim");

        let result = verify(b"tampered claim", &block, &verifying_key);
        assert!(!result.valid);
        assert_eq!(result.failure, Some(VerifyFailure::SignatureMismatch));
    }

    #[test]
    fn test_verify_fails_on_wrong_key() {
        let (_, block) = signed(b"canonical claim");
        let different_key = SigningKey::from_bytes(&[0x99; 32]).verifying_key();

        let result = verify(b"canonical claim", &block, &different_key);
        assert_eq!(result.failure, Some(VerifyFailure::FingerprintMismatch));
    }

    #[test]
    fn test_swapped_fingerprint_fails_declared_verification() {
        let (_, mut block) = signed(b"canonical claim");
        let other = SigningKey::from_bytes(&[0x99; 32]).verifying_key();
        block.public_key_fingerprint = public_key_fingerprint(&other);

        let result = verify_declared(b"canonical claim", &block);
        assert_eq!(result.failure, Some(VerifyFailure::SignatureMismatch));
    }

    #[test]
    fn test_verify_fails_on_wrong_signature_length() {
        let (verifying_key, mut block) = signed(b"canonical claim");
        block.signature_bytes.truncate(32);

        let result = verify(b"canonical claim", &block, &verifying_key);
        assert_eq!(result.failure, Some(VerifyFailure::MalformedSignature));
    }

    #[test]
    fn test_undecodable_fingerprint() {
        let (_, mut block) = signed(b"canonical claim");
        block.public_key_fingerprint = "did:web:example.org".to_string();

        let result = verify_declared(b"canonical claim", &block);
        assert_eq!(result.failure, Some(VerifyFailure::InvalidKeyFormat));
    }
}
