//! Store backends for Zarr V3 trees.
//!
//! A store is addressed by URL: `file://` for the local filesystem,
//! `s3://bucket/prefix` for object storage (MinIO/S3 compatible) and
//! `memory:` for an in-process store used by tests. Object storage goes
//! through an async-to-sync adapter so the whole crate can stay on the
//! synchronous `zarrs` API.

use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use zarrs::storage::ReadableWritableListableStorage;
use zarrs_filesystem::FilesystemStore;
use zarrs_object_store::AsyncObjectStore;
use zarrs_storage::storage_adapter::async_to_sync::{
    AsyncToSyncBlockOn, AsyncToSyncStorageAdapter,
};
use zarrs_storage::store::MemoryStore;
use zarrs_storage::{
    ListableStorageTraits, ReadableStorageTraits, StoreKey, StorePrefix, WritableStorageTraits,
};

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};

/// Shared handle to an open store.
pub type DynStore = ReadableWritableListableStorage;

/// Blocking executor that works from within a tokio runtime.
///
/// Uses `tokio::task::block_in_place` to move the current task to a blocking
/// thread, then uses the runtime handle to drive the future. Falls back to a
/// private runtime when called outside tokio entirely.
#[derive(Clone, Copy)]
pub struct TokioBlockOn;

impl AsyncToSyncBlockOn for TokioBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(|| handle.block_on(future)),
            Err(_) => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("build blocking runtime")
                .block_on(future),
        }
    }
}

/// An open store plus the capabilities the logger cares about.
#[derive(Clone)]
pub struct StoreHandle {
    /// The store itself.
    pub store: DynStore,
    /// Whether the backend supports partial-value writes (byte appends).
    pub supports_partial_writes: bool,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("supports_partial_writes", &self.supports_partial_writes)
            .finish_non_exhaustive()
    }
}

/// What a store key prefix resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A Zarr group (`zarr.json` with `node_type: group`).
    Group,
    /// A Zarr array (`zarr.json` with `node_type: array`).
    Array,
    /// Nothing stored under the prefix.
    Absent,
}

/// Open a store for the given connection parameters.
pub fn open(config: &StorageConfig) -> Result<StoreHandle> {
    let url = config.url.trim();
    if url == "memory:" || url == "memory://" {
        let store: DynStore = Arc::new(MemoryStore::new());
        return Ok(StoreHandle {
            store,
            supports_partial_writes: false,
        });
    }
    if let Some(path) = url.strip_prefix("file://") {
        return open_filesystem(config, path);
    }
    if let Some(rest) = url.strip_prefix("s3://") {
        return open_s3(config, rest);
    }
    Err(StorageError::UnsupportedUrl(url.to_string()))
}

fn open_filesystem(config: &StorageConfig, path: &str) -> Result<StoreHandle> {
    let mut root = PathBuf::from(path);
    if root.is_relative() {
        if let Some(workdir) = &config.workdir {
            root = PathBuf::from(workdir).join(root);
        }
    }
    std::fs::create_dir_all(&root)?;
    let store = FilesystemStore::new(&root).map_err(|e| StorageError::open_failed(e.to_string()))?;
    tracing::debug!(path = %root.display(), "Opened filesystem store");
    Ok(StoreHandle {
        store: Arc::new(store),
        // Local files can be appended to in place.
        supports_partial_writes: true,
    })
}

fn open_s3(config: &StorageConfig, bucket_and_prefix: &str) -> Result<StoreHandle> {
    let (bucket, _prefix) = match bucket_and_prefix.split_once('/') {
        Some((b, p)) => (b, p.trim_end_matches('/')),
        None => (bucket_and_prefix, ""),
    };
    if bucket.is_empty() {
        return Err(StorageError::UnsupportedUrl(config.url.clone()));
    }

    let endpoint = config
        .endpoint
        .as_deref()
        .ok_or_else(|| StorageError::MissingOption(crate::config::KEY_ENDPOINT.to_string()))?;
    let access_key = config
        .access_key
        .as_deref()
        .ok_or_else(|| StorageError::MissingOption(crate::config::KEY_ACCESS_KEY.to_string()))?;
    let secret_key = config
        .secret_key
        .as_deref()
        .ok_or_else(|| StorageError::MissingOption(crate::config::KEY_SECRET_KEY.to_string()))?;

    let opts = config.parsed_options()?;
    let region = opts
        .get("region")
        .and_then(|v| v.as_str())
        .unwrap_or("us-east-1");
    let allow_http = opts
        .get("allow_http")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let s3 = AmazonS3Builder::new()
        .with_endpoint(endpoint)
        .with_bucket_name(bucket)
        .with_access_key_id(access_key)
        .with_secret_access_key(secret_key)
        .with_region(region)
        .with_allow_http(allow_http)
        .build()
        .map_err(|e| StorageError::open_failed(format!("failed to create S3 client: {e}")))?;

    let async_store = Arc::new(AsyncObjectStore::new(s3));
    let sync_store = AsyncToSyncStorageAdapter::new(async_store, TokioBlockOn);
    tracing::debug!(bucket, endpoint, "Opened S3 store");
    Ok(StoreHandle {
        store: Arc::new(sync_store),
        // Zarr object stores reject partial value writes.
        supports_partial_writes: false,
    })
}

/// Store key of the Zarr V3 metadata document for a group path.
///
/// `group_path` is "/"-separated and empty for the root group.
pub fn metadata_key(group_path: &str) -> Result<StoreKey> {
    let path = group_path.trim_matches('/');
    let key = if path.is_empty() {
        "zarr.json".to_string()
    } else {
        format!("{path}/zarr.json")
    };
    StoreKey::new(&key).map_err(|e| StorageError::io(e.to_string()))
}

/// Probe what kind of entry lives under a group path.
pub fn probe(store: &DynStore, group_path: &str) -> Result<EntryKind> {
    let key = metadata_key(group_path)?;
    let Some(bytes) = store.get(&key)? else {
        return Ok(EntryKind::Absent);
    };
    let meta: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::io(format!("invalid zarr.json at {key}: {e}")))?;
    match meta.get("node_type").and_then(|v| v.as_str()) {
        Some("group") => Ok(EntryKind::Group),
        Some("array") => Ok(EntryKind::Array),
        other => Err(StorageError::io(format!(
            "zarr.json at {key} carries unknown node_type {other:?}"
        ))),
    }
}

/// List the names of child groups directly under a group path.
///
/// Array children (coordinate and variable arrays) are filtered out via
/// [`probe`], so the result is exactly the set of sub-nodes of the tree.
pub fn child_groups(store: &DynStore, group_path: &str) -> Result<Vec<String>> {
    let path = group_path.trim_matches('/');
    let prefix = if path.is_empty() {
        StorePrefix::root()
    } else {
        StorePrefix::new(format!("{path}/")).map_err(|e| StorageError::io(e.to_string()))?
    };
    let listing = store.list_dir(&prefix)?;

    let mut names = Vec::new();
    for child in listing.prefixes() {
        let child_path = child.as_str().trim_end_matches('/');
        let name = child_path
            .rsplit('/')
            .next()
            .unwrap_or(child_path)
            .to_string();
        if name == "logs" {
            continue;
        }
        if probe(store, child_path)? == EntryKind::Group {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Erase everything stored under a group path (recursively).
pub fn erase_tree(store: &DynStore, group_path: &str) -> Result<()> {
    let path = group_path.trim_matches('/');
    let prefix = if path.is_empty() {
        StorePrefix::root()
    } else {
        StorePrefix::new(format!("{path}/")).map_err(|e| StorageError::io(e.to_string()))?
    };
    store.erase_prefix(&prefix)?;
    if !path.is_empty() {
        store.erase(&metadata_key(path)?)?;
    }
    Ok(())
}
