// JCS (JSON Canonicalization Scheme) - RFC 8785
//
// Canonical bytes are the input to both content addressing and signing, so
// two semantically equal values must always produce the same bytes.

use serde::Serialize;

use crate::error::CryptoError;

/// Canonicalizes a serializable value according to RFC 8785 and returns the UTF-8 bytes.
///
/// - Object keys are sorted lexicographically, at every nesting level
/// - No insignificant whitespace
/// - Numbers and strings use the RFC 8785 normal forms
pub fn jcs_canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CryptoError> {
    let canonical =
        serde_jcs::to_string(value).map_err(|e| CryptoError::Canonicalization(e.to_string()))?;
    Ok(canonical.into_bytes())
}
