//! Error types for dataset trees.

use thiserror::Error;

/// Fatal, address-scoped schema problem.
///
/// The address pins the offending value inside the schema source, rendered
/// as `<file>:<path/to/key>` (see [`crate::schema::SchemaAddress`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}  (at {address})")]
pub struct SchemaError {
    /// What is wrong.
    pub message: String,
    /// Where in the schema source it is wrong.
    pub address: String,
}

impl SchemaError {
    pub fn new(message: impl Into<String>, address: &str) -> Self {
        Self {
            message: message.into(),
            address: address.to_string(),
        }
    }
}

/// Non-fatal, address-scoped schema issue with a defined default resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaWarning {
    /// What was tolerated.
    pub message: String,
    /// Where in the schema source.
    pub address: String,
}

impl SchemaWarning {
    pub fn new(message: impl Into<String>, address: &str) -> Self {
        Self {
            message: message.into(),
            address: address.to_string(),
        }
    }
}

impl std::fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}  (at {})", self.message, self.address)
    }
}

/// Errors raised by tree construction, pivot and merge operations.
#[derive(Error, Debug)]
pub enum TreeError {
    /// Schema validation failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Storage backend failure; propagated unchanged, no retry in the core.
    #[error(transparent)]
    Storage(#[from] storage::StorageError),

    /// Zarr format / array operation error.
    #[error("zarr error: {0}")]
    Zarr(String),

    /// Unit parsing or conversion failure.
    #[error("unit error: {0}")]
    Unit(String),

    /// DType parsing or conversion failure.
    #[error("dtype error: {0}")]
    DType(String),

    /// The tabular input does not fit the schema.
    #[error("pivot error: {0}")]
    Pivot(String),

    /// The incoming dataset cannot be merged onto the stored one.
    #[error("merge error: {0}")]
    Merge(String),

    /// On-disk structure disagrees with the schema passed in.
    #[error("structure mismatch at node '{node}': {detail}")]
    StructureMismatch {
        /// Group path of the node.
        node: String,
        /// What differs.
        detail: String,
    },

    /// A requested child or variable does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl TreeError {
    /// Create a Zarr error.
    pub fn zarr(msg: impl Into<String>) -> Self {
        Self::Zarr(msg.into())
    }

    /// Create a merge error.
    pub fn merge(msg: impl Into<String>) -> Self {
        Self::Merge(msg.into())
    }

    /// Create a pivot error.
    pub fn pivot(msg: impl Into<String>) -> Self {
        Self::Pivot(msg.into())
    }
}

impl From<zarrs::array::ArrayError> for TreeError {
    fn from(err: zarrs::array::ArrayError) -> Self {
        Self::Zarr(err.to_string())
    }
}

impl From<zarrs::array::ArrayCreateError> for TreeError {
    fn from(err: zarrs::array::ArrayCreateError) -> Self {
        Self::Zarr(err.to_string())
    }
}

impl From<zarrs::array_subset::IncompatibleDimensionalityError> for TreeError {
    fn from(err: zarrs::array_subset::IncompatibleDimensionalityError) -> Self {
        Self::Zarr(err.to_string())
    }
}

impl From<zarrs_storage::StorageError> for TreeError {
    fn from(err: zarrs_storage::StorageError) -> Self {
        Self::Zarr(err.to_string())
    }
}

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;
