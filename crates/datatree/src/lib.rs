//! Schema-driven hierarchical dataset trees on chunked-array storage.
//!
//! A YAML schema declares a tree of nodes, each owning coordinates,
//! variables and free-form attributes. This crate materializes that tree on
//! a Zarr store and keeps it updatable: tabular rows pivot into N-D
//! datasets, incoming coordinates interpolate onto the stored grid, and
//! every write lands as one rectangular overwrite plus per-axis appends so
//! the store stays readable throughout.
//!
//! The storage backends, the handle registry and the store-embedded logger
//! live in the `storage` crate; this crate owns the semantics above them.

pub mod dataset;
pub mod dtype;
pub mod error;
pub mod frame;
pub mod interpolate;
pub mod node;
pub mod pivot;
pub mod schema;
pub mod units;

pub use dataset::{CoordValues, Dataset};
pub use dtype::{DType, TrimmedCast};
pub use error::{Result, SchemaError, SchemaWarning, TreeError};
pub use frame::{Column, Frame};
pub use node::{open_store, read_store, remove_store, Node, Selector};
pub use schema::{deserialize, serialize, Coord, DatasetSchema, NodeSchema, StepLimits, Variable};
pub use units::{DateTimeUnit, Tick, Unit, UnitSpec};
