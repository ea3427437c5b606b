// Public key fingerprints as did:key identifiers (Ed25519, multicodec 0xed01)
//
// The fingerprint embeds the whole public key, so a signature block that
// declares its fingerprint also declares the key needed to verify it.

use ed25519_dalek::VerifyingKey;

use crate::error::CryptoError;

/// Multicodec prefix for Ed25519 public keys
const ED25519_MULTICODEC_PREFIX: [u8; 2] = [0xed, 0x01];

const DID_KEY_PREFIX: &str = "did:key:z";

/// Encodes an Ed25519 public key as `did:key:z<base58btc(0xed01 || key)>`.
pub fn public_key_fingerprint(public_key: &VerifyingKey) -> String {
    let key_bytes = public_key.as_bytes();

    let mut multicodec_bytes = Vec::with_capacity(ED25519_MULTICODEC_PREFIX.len() + key_bytes.len());
    multicodec_bytes.extend_from_slice(&ED25519_MULTICODEC_PREFIX);
    multicodec_bytes.extend_from_slice(key_bytes);

    format!("{}{}", DID_KEY_PREFIX, bs58::encode(&multicodec_bytes).into_string())
}

/// Recovers the Ed25519 public key declared by a `did:key` fingerprint.
pub fn key_from_fingerprint(fingerprint: &str) -> Result<VerifyingKey, CryptoError> {
    let encoded = fingerprint.strip_prefix(DID_KEY_PREFIX).ok_or_else(|| {
        CryptoError::InvalidKeyFormat(format!(
            "fingerprint '{}' is not a did:key identifier",
            fingerprint
        ))
    })?;

    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid base58 in fingerprint: {}", e)))?;

    let Some(key_bytes) = decoded.strip_prefix(&ED25519_MULTICODEC_PREFIX) else {
        return Err(CryptoError::InvalidKeyFormat(
            "fingerprint does not carry an Ed25519 multicodec prefix".to_string(),
        ));
    };

    let key_array: [u8; 32] = key_bytes.try_into().map_err(|_| {
        CryptoError::InvalidKeyFormat(format!(
            "expected 32 public key bytes, got {}",
            key_bytes.len()
        ))
    })?;

    VerifyingKey::from_bytes(&key_array)
        .map_err(|e| CryptoError::InvalidKeyFormat(format!("not a valid Ed25519 point: {}", e)))
}
