// Networked database backend
//
// Talks to a manifest service over HTTP. Each store operation maps to one
// request; the manifest id travels in the URL path and the body is the
// stored (canonical) encoding. Only transport failures and gateway errors
// are retried.

use std::io::Read;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::retry::RetryPolicy;
use super::{encode_for_put, ListFilter, ManifestStore};
use crate::error::{Error, Result, StorageError};
use crate::model::{Manifest, ManifestId};

const API_PATH: &str = "/api/v1/manifests";

/// Body of `GET /api/v1/manifests`.
#[derive(Debug, Deserialize)]
struct ListResponse {
    ids: Vec<ManifestId>,
}

pub struct DatabaseStore {
    base_url: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl DatabaseStore {
    pub fn new(base_url: &str, retry: RetryPolicy, timeout_secs: u64) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "database storage URL must be http(s), got '{}'",
                base_url
            )));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(timeout_secs))
            .build();

        Ok(Self {
            base_url,
            agent,
            retry,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}{}", self.base_url, API_PATH)
    }

    fn manifest_url(&self, id: &ManifestId) -> String {
        format!("{}{}/{}", self.base_url, API_PATH, id)
    }
}

/// Maps a ureq failure onto the storage taxonomy.
fn classify(err: ureq::Error, id: Option<&ManifestId>) -> StorageError {
    match err {
        ureq::Error::Status(404, response) => match id {
            Some(id) => StorageError::NotFound(id.clone()),
            None => StorageError::Rejected {
                status: 404,
                message: response.into_string().unwrap_or_default(),
            },
        },
        ureq::Error::Status(status @ (502 | 503 | 504), _) => {
            StorageError::Transient(format!("HTTP {}", status))
        }
        ureq::Error::Status(status, response) => StorageError::Rejected {
            status,
            message: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => StorageError::Transient(transport.to_string()),
    }
}

impl ManifestStore for DatabaseStore {
    fn put(&self, manifest: &Manifest) -> Result<ManifestId> {
        let bytes = encode_for_put(manifest)?;
        let url = self.manifest_url(&manifest.id);

        let status = self.retry.run("put", || {
            self.agent
                .put(&url)
                .set("Content-Type", "application/json")
                .send_bytes(&bytes)
                .map(|response| response.status())
                .map_err(|e| classify(e, None))
        })?;

        debug!(id = %manifest.id, status, "Stored manifest in database");
        Ok(manifest.id.clone())
    }

    fn get_encoded(&self, id: &ManifestId) -> Result<Vec<u8>> {
        let url = self.manifest_url(id);

        let bytes = self.retry.run("get", || {
            let response = self.agent.get(&url).call().map_err(|e| classify(e, Some(id)))?;
            let mut body = Vec::new();
            response
                .into_reader()
                .read_to_end(&mut body)
                .map_err(|e| StorageError::Transient(format!("reading response body: {}", e)))?;
            Ok(body)
        })?;

        Ok(bytes)
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<ManifestId>> {
        let url = self.collection_url();

        let mut ids = self.retry.run("list", || {
            let mut request = self.agent.get(&url);
            if let Some(kind) = filter.kind {
                request = request.query("kind", kind.as_str());
            }
            let response = request.call().map_err(|e| classify(e, None))?;
            response
                .into_json::<ListResponse>()
                .map(|body| body.ids)
                .map_err(|e| StorageError::Corrupt {
                    location: url.clone(),
                    detail: e.to_string(),
                })
        })?;

        ids.sort();
        Ok(ids)
    }

    fn exists(&self, id: &ManifestId) -> Result<bool> {
        let url = self.manifest_url(id);

        let found = self.retry.run("exists", || {
            match self.agent.head(&url).call() {
                Ok(_) => Ok(true),
                Err(ureq::Error::Status(404, _)) => Ok(false),
                Err(e) => Err(classify(e, None)),
            }
        })?;
        Ok(found)
    }

    fn describe(&self) -> String {
        format!("database:{}", self.base_url)
    }
}
