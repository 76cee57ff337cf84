//! Store connection configuration.
//!
//! Connection parameters are interpreted from the schema root ATTRS map;
//! every key can be overridden by a `DATATREE_`-prefixed environment
//! variable (e.g. `DATATREE_STORE_URL`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// ATTRS key holding the store URL.
pub const KEY_STORE_URL: &str = "STORE_URL";
/// ATTRS key holding the S3/MinIO endpoint.
pub const KEY_ENDPOINT: &str = "S3_ENDPOINT_URL";
/// ATTRS key holding the S3 access key id.
pub const KEY_ACCESS_KEY: &str = "S3_ACCESS_KEY";
/// ATTRS key holding the S3 secret key.
pub const KEY_SECRET_KEY: &str = "S3_SECRET_KEY";
/// ATTRS key holding a JSON blob of extra backend options.
pub const KEY_OPTIONS: &str = "STORE_OPTIONS";
/// ATTRS key holding the working directory for relative file URLs.
pub const KEY_WORKDIR: &str = "WORKDIR";

/// Prefix for environment-variable overrides of the ATTRS keys.
pub const ENV_PREFIX: &str = "DATATREE_";

/// Connection parameters for a dataset store.
///
/// Also the cache key for [`crate::registry::StoreRegistry`]: two configs
/// compare equal exactly when they address the same store handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store URL: `file://...`, `s3://bucket/prefix` or `memory:`.
    pub url: String,
    /// S3/MinIO endpoint URL, required for `s3://` stores.
    pub endpoint: Option<String>,
    /// S3 access key id.
    pub access_key: Option<String>,
    /// S3 secret access key.
    pub secret_key: Option<String>,
    /// Extra backend options (JSON object serialized to a string, e.g.
    /// `{"region": "us-east-1", "allow_http": true}`).
    pub options: Option<String>,
    /// Working directory resolving relative `file://` paths.
    pub workdir: Option<String>,
}

impl StorageConfig {
    /// Build a config for a plain URL with no credentials.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            options: None,
            workdir: None,
        }
    }

    /// Interpret the schema root ATTRS, applying environment overrides.
    ///
    /// The `STORE_URL` key is mandatory (after overrides); everything else
    /// is optional and validated lazily by the backend that needs it.
    pub fn from_attrs(attrs: &BTreeMap<String, serde_json::Value>) -> Result<Self> {
        let lookup = |key: &str| -> Option<String> {
            if let Ok(v) = std::env::var(format!("{ENV_PREFIX}{key}")) {
                return Some(v);
            }
            attrs.get(key).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        };

        let url = lookup(KEY_STORE_URL)
            .ok_or_else(|| StorageError::MissingOption(KEY_STORE_URL.to_string()))?;

        Ok(Self {
            url,
            endpoint: lookup(KEY_ENDPOINT),
            access_key: lookup(KEY_ACCESS_KEY),
            secret_key: lookup(KEY_SECRET_KEY),
            options: lookup(KEY_OPTIONS),
            workdir: lookup(KEY_WORKDIR),
        })
    }

    /// Parse the extra-options blob into a JSON object.
    pub fn parsed_options(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        match &self.options {
            None => Ok(serde_json::Map::new()),
            Some(raw) => match serde_json::from_str(raw) {
                Ok(serde_json::Value::Object(map)) => Ok(map),
                Ok(other) => Err(StorageError::InvalidOptions(format!(
                    "expected a JSON object, got: {other}"
                ))),
                Err(e) => Err(StorageError::InvalidOptions(e.to_string())),
            },
        }
    }
}
