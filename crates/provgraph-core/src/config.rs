// Engine configuration value objects
//
// Callers (CLI, server, embedding applications) resolve flags, environment
// variables or files into these types; the engine only ever sees validated
// values.

use std::path::{Path, PathBuf};

use provgraph_crypto::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::linker::LinkPolicy;
use crate::storage::RetryPolicy;
use crate::validator::ValidationOptions;

/// Default request timeout for the database backend
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const FILE_URL_PREFIX: &str = "file://";

/// Which backend to use and where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StorageConfig {
    Filesystem {
        path: PathBuf,
    },
    Database {
        url: String,
        #[serde(default)]
        retry: RetryPolicy,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    TransparencyLog {
        path: PathBuf,
    },
    Memory,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl StorageConfig {
    /// Builds a config from a backend name and its location (path or URL).
    ///
    /// Accepted names: `local-fs`/`filesystem`/`file`, `database`/`db`,
    /// `transparency-log`/`tlog`/`rekor`, `memory`.
    pub fn from_parts(kind: &str, location: Option<&str>) -> Result<Self> {
        let kind = kind.trim().to_ascii_lowercase();
        let location = location.map(str::trim).filter(|l| !l.is_empty());

        let require = |what: &str| {
            location.ok_or_else(|| {
                Error::InvalidConfig(format!("storage type '{}' requires a {}", kind, what))
            })
        };

        let config = match kind.as_str() {
            "local-fs" | "filesystem" | "file" | "fs" => StorageConfig::Filesystem {
                path: local_path(require("directory path")?),
            },
            "database" | "db" => StorageConfig::Database {
                url: require("URL")?.to_string(),
                retry: RetryPolicy::default(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            },
            "transparency-log" | "tlog" | "rekor" => StorageConfig::TransparencyLog {
                path: local_path(require("directory path")?),
            },
            "memory" => StorageConfig::Memory,
            other => {
                return Err(Error::InvalidConfig(format!(
                    "unknown storage type '{}' (expected local-fs, database, transparency-log or memory)",
                    other
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            StorageConfig::Filesystem { path } | StorageConfig::TransparencyLog { path } => {
                if path.as_os_str().is_empty() {
                    return Err(Error::InvalidConfig("storage path is empty".to_string()));
                }
            }
            StorageConfig::Database {
                url,
                retry,
                timeout_secs,
            } => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(Error::InvalidConfig(format!(
                        "database URL must start with http:// or https://, got '{}'",
                        url
                    )));
                }
                if retry.max_attempts == 0 {
                    return Err(Error::InvalidConfig(
                        "retry.max_attempts must be at least 1".to_string(),
                    ));
                }
                if *timeout_secs == 0 {
                    return Err(Error::InvalidConfig("timeout_secs must be positive".to_string()));
                }
            }
            StorageConfig::Memory => {}
        }
        Ok(())
    }
}

fn local_path(location: &str) -> PathBuf {
    Path::new(location.strip_prefix(FILE_URL_PREFIX).unwrap_or(location)).to_path_buf()
}

/// Everything the engine needs from its embedding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub storage: StorageConfig,

    /// Used for ingredients that do not name an algorithm
    #[serde(default)]
    pub default_hash_algorithm: HashAlgorithm,

    /// Key file used to sign new manifests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<PathBuf>,

    #[serde(default)]
    pub link_policy: LinkPolicy,

    #[serde(default)]
    pub validation: ValidationOptions,
}

impl EngineConfig {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            default_hash_algorithm: HashAlgorithm::default(),
            signing_key: None,
            link_policy: LinkPolicy::default(),
            validation: ValidationOptions::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        if let Some(key) = &self.signing_key {
            if key.as_os_str().is_empty() {
                return Err(Error::InvalidConfig("signing_key path is empty".to_string()));
            }
        }
        Ok(())
    }
}
