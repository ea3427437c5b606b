// Canonical claim bytes and content-addressed ids

use provgraph_crypto::{hash_bytes, jcs_canonical_bytes, HashAlgorithm};

use crate::error::Result;
use crate::model::{Claim, ManifestId};

/// RFC 8785 bytes of a claim. These are both hashed for the id and signed.
pub fn claim_bytes(claim: &Claim) -> Result<Vec<u8>> {
    Ok(jcs_canonical_bytes(claim)?)
}

/// Content address of a claim.
pub fn content_id(claim: &Claim) -> Result<ManifestId> {
    Ok(id_for_bytes(&claim_bytes(claim)?))
}

pub(crate) fn id_for_bytes(canonical: &[u8]) -> ManifestId {
    ManifestId::from_digest(&hash_bytes(canonical, HashAlgorithm::Sha256))
}
