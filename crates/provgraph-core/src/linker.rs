//! Linker.
//!
//! Linking never edits a stored manifest. It seals a new version of the
//! source whose `linked_manifests` gains the target and whose
//! `previous_version` points at the source, then stores that version.
//!
//! Concurrent links of the same source legitimately produce sibling versions
//! that share a predecessor; callers wanting one linear history must
//! serialize their links.

use provgraph_crypto::SigningSecret;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::builder::seal;
use crate::error::{Error, Result};
use crate::model::ManifestId;
use crate::storage::ManifestStore;

/// How to treat a link target that is not (yet) in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPolicy {
    /// Missing targets are rejected with `UnknownManifest`
    #[default]
    Strict,
    /// Missing targets are accepted as pending forward references
    Lenient,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkOptions<'a> {
    pub policy: LinkPolicy,
    /// Signs the new version when present; otherwise it is stored unsigned
    pub signer: Option<&'a SigningSecret>,
}

/// Links `source_id` to `target_id` and returns the id of the new source version.
pub fn link(
    source_id: &ManifestId,
    target_id: &ManifestId,
    store: &dyn ManifestStore,
    options: &LinkOptions<'_>,
) -> Result<ManifestId> {
    let source = store
        .get(source_id)
        .map_err(|e| e.into_unknown(source_id))?;

    if !store.exists(target_id)? {
        match options.policy {
            LinkPolicy::Strict => return Err(Error::UnknownManifest(target_id.clone())),
            LinkPolicy::Lenient => {
                warn!(
                    source = %source_id,
                    target = %target_id,
                    "Link target not in store; recording pending forward reference"
                );
            }
        }
    }

    if source_id == target_id {
        return Err(Error::SelfLink(source_id.clone()));
    }

    if source.claim.linked_manifests.contains(target_id) {
        return Err(Error::DuplicateLink {
            source_id: source_id.clone(),
            target_id: target_id.clone(),
        });
    }

    let mut claim = source.claim;
    claim.linked_manifests.insert(target_id.clone());
    claim.previous_version = Some(source_id.clone());

    let new_version = seal(claim, options.signer)?;
    let new_id = store.put(&new_version)?;

    info!(
        source = %source_id,
        target = %target_id,
        new_version = %new_id,
        signed = new_version.signature.is_some(),
        "Linked manifest"
    );
    Ok(new_id)
}
