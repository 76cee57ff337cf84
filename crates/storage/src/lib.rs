//! Storage layer for schema-driven Zarr V3 dataset trees.
//!
//! This crate owns everything below the dataset semantics:
//!
//! - **Backends** ([`backend`]): opening a readable+writable+listable Zarr
//!   store over the local filesystem, S3-compatible object storage or an
//!   in-process memory store, plus tagged probing of group vs. array
//!   entries.
//! - **Registry** ([`registry`]): a process-wide, injectable cache of open
//!   store handles keyed by connection parameters.
//! - **Store-embedded logging** ([`logger`]): per-node handlers appending
//!   structured records to dated objects inside the store itself.

pub mod backend;
pub mod config;
pub mod error;
pub mod logger;
pub mod registry;

pub use backend::{child_groups, erase_tree, metadata_key, probe, DynStore, EntryKind, StoreHandle};
pub use config::StorageConfig;
pub use error::{Result, StorageError};
pub use logger::{LogLevel, StoreLogger};
pub use registry::StoreRegistry;
