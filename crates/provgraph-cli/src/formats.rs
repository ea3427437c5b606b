// Output formats for manifests, graphs and DSSE envelopes

use std::str::FromStr;

use anyhow::{Context, Result};
use clap::ValueEnum;
use provgraph_core::{
    open_envelope, sign_statement, Encoding, Envelope, ManifestId, ProvenanceGraph, SigningSecret,
};
use provgraph_crypto::VerifyFailure;
use serde::Serialize;

/// How a single manifest is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Encoded(Encoding),
    /// in-toto Statement in a signed DSSE envelope
    Dsse,
}

impl FromStr for ManifestFormat {
    type Err = provgraph_core::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dsse" | "in-toto-dsse" => Ok(ManifestFormat::Dsse),
            other => other.parse().map(ManifestFormat::Encoded),
        }
    }
}

impl ManifestFormat {
    pub fn needs_signer(&self) -> bool {
        matches!(self, ManifestFormat::Dsse)
    }

    pub fn render(&self, manifest: &provgraph_core::Manifest, signer: Option<&SigningSecret>) -> Result<Vec<u8>> {
        match self {
            ManifestFormat::Encoded(encoding) => Ok(manifest.encode(*encoding)?),
            ManifestFormat::Dsse => {
                let signer = signer.context("--format dsse requires a signing key (--key)")?;
                let envelope = sign_statement(manifest, signer)?;
                Ok(serde_json::to_vec_pretty(&envelope)?)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    #[default]
    Json,
    Yaml,
}

pub fn render_graph(graph: &ProvenanceGraph, format: GraphFormat) -> Result<String> {
    match format {
        GraphFormat::Json => Ok(serde_json::to_string_pretty(graph)?),
        GraphFormat::Yaml => serde_yaml::to_string(graph).context("Failed to encode graph as YAML"),
    }
}

/// Outcome of checking a DSSE envelope from disk.
#[derive(Debug, Serialize)]
pub struct EnvelopeCheck {
    pub id: ManifestId,
    pub valid: bool,
    pub failure: Option<VerifyFailure>,
    pub signers: Vec<String>,
    /// Signers missing from the trust list, when one was given
    pub untrusted: Vec<String>,
}

pub fn check_envelope(bytes: &[u8], trusted_signers: &[String]) -> Result<EnvelopeCheck> {
    let envelope: Envelope = serde_json::from_slice(bytes).context("Input is not a DSSE envelope")?;
    let attestation = open_envelope(&envelope)?;

    let untrusted: Vec<String> = if trusted_signers.is_empty() {
        Vec::new()
    } else {
        attestation
            .signers
            .iter()
            .filter(|signer| !trusted_signers.contains(signer))
            .cloned()
            .collect()
    };

    Ok(EnvelopeCheck {
        id: attestation.manifest.id,
        valid: attestation.verification.valid && untrusted.is_empty(),
        failure: attestation.verification.failure,
        signers: attestation.signers,
        untrusted,
    })
}
