// provgraph-crypto - Hashing, canonicalization and signing primitives for provenance manifests

pub mod dsse;
pub mod error;
pub mod fingerprint;
pub mod hash;
pub mod jcs;
pub mod keys;
pub mod sign;
pub mod types;
pub mod verify;

pub use dsse::{pae, Envelope, EnvelopeSignature, IN_TOTO_PAYLOAD_TYPE};
pub use error::CryptoError;
pub use fingerprint::{key_from_fingerprint, public_key_fingerprint};
pub use hash::{
    digests_equal, hash_bytes, hash_file, hash_path, hash_reader, ArtifactDigest, HashAlgorithm,
};
pub use jcs::jcs_canonical_bytes;
pub use keys::{
    generate_keypair, parse_public_key, signing_key_to_pem, verifying_key_to_pem, SigningSecret,
};
pub use sign::sign;
pub use types::{SignatureAlgorithm, SignatureBlock, Verification, VerifyFailure};
pub use verify::{verify, verify_declared};
