//! Node tree over a chunked store.
//!
//! A [`Node`] binds one group path of a store to one schema node. Opening a
//! store reconciles the schema tree against the on-disk hierarchy: missing
//! groups are created with zero-length arrays and flagged empty, existing
//! groups must match the schema structurally. Updates pivot tabular rows
//! into an N-D dataset, align it onto the stored grid and write it as one
//! rectangular overlap overwrite plus per-axis appends.

use std::collections::BTreeMap;

use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_storage::ReadableWritableListableStorageTraits;

use storage::{child_groups, probe, EntryKind, StoreHandle, StoreLogger, StoreRegistry, StorageConfig};

use crate::dataset::{CoordKey, CoordValues, Dataset};
use crate::dtype::DType;
use crate::error::{Result, TreeError};
use crate::frame::{Column, Frame};
use crate::interpolate::{interpolate_ds, Interpolated};
use crate::pivot::pivot;
use crate::schema::{self, Coord, DatasetSchema, NodeSchema};
use crate::units::UnitSpec;

/// Group attribute holding the serialized schema of the subtree.
pub const ATTR_STRUCTURE: &str = "__structure__";
/// Group attribute set until the first write.
pub const ATTR_EMPTY: &str = "__empty__";

type ZarrArray = Array<dyn ReadableWritableListableStorageTraits>;

/// Exact-match selector for [`Node::read_df`].
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    F64(f64),
    Str(String),
}

/// One group of the store, bound to its schema node.
pub struct Node {
    name: String,
    group_path: String,
    schema: NodeSchema,
    handle: StoreHandle,
    logger: StoreLogger,
    empty: bool,
    children: Vec<Node>,
}

/// Open (and create where absent) the tree a schema describes. Connection
/// parameters come from the root `ATTRS`, each overridable by environment.
pub fn open_store(schema: &NodeSchema, registry: &StoreRegistry) -> Result<Node> {
    let config = StorageConfig::from_attrs(&schema.dataset.attrs)?;
    let handle = registry.open(&config)?;
    Node::build(&handle, schema.clone(), String::new())
}

/// Open an existing tree, taking the schema from the store itself.
pub fn read_store(config: &StorageConfig, registry: &StoreRegistry) -> Result<Node> {
    let handle = registry.open(config)?;
    let attrs = read_group_attrs(&handle, "")?
        .ok_or_else(|| TreeError::NotFound("store has no root group".to_string()))?;
    let text = attrs
        .get(ATTR_STRUCTURE)
        .and_then(|v| v.as_str())
        .ok_or_else(|| TreeError::NotFound("root group carries no schema".to_string()))?;
    let (schema, _) = schema::deserialize(text, "store")?;
    Node::build(&handle, schema, String::new())
}

/// Erase the whole tree and drop the cached handle.
pub fn remove_store(schema: &NodeSchema, registry: &StoreRegistry) -> Result<()> {
    let config = StorageConfig::from_attrs(&schema.dataset.attrs)?;
    let handle = registry.open(&config)?;
    storage::erase_tree(&handle.store, "")?;
    registry.evict(&config);
    Ok(())
}

impl Node {
    fn build(handle: &StoreHandle, schema: NodeSchema, group_path: String) -> Result<Node> {
        let logger = StoreLogger::new(handle, group_path.clone());
        let empty = match probe(&handle.store, &group_path)? {
            EntryKind::Array => {
                return Err(TreeError::StructureMismatch {
                    node: group_path,
                    detail: "an array sits where a group is expected".to_string(),
                })
            }
            EntryKind::Absent => {
                materialize(handle, &schema, &group_path)?;
                true
            }
            EntryKind::Group => reconcile(handle, &schema, &group_path)?,
        };

        // Children are the union of schema-declared and on-disk groups.
        let mut children = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        for (name, child_schema) in &schema.children {
            let child_path = join_path(&group_path, name);
            children.push(Node::build(handle, child_schema.clone(), child_path)?);
            seen.push(name.clone());
        }
        for name in child_groups(&handle.store, &group_path)? {
            if seen.contains(&name) {
                continue;
            }
            let child_path = join_path(&group_path, &name);
            logger.warning(format!(
                "group '{child_path}' exists in storage but not in the schema"
            ));
            let child_schema = match read_group_attrs(handle, &child_path)?
                .and_then(|a| a.get(ATTR_STRUCTURE).and_then(|v| v.as_str()).map(str::to_string))
            {
                Some(text) => schema::deserialize(&text, &child_path)?.0,
                None => NodeSchema {
                    address: child_path.clone(),
                    dataset: DatasetSchema::default(),
                    children: Vec::new(),
                },
            };
            children.push(Node::build(handle, child_schema, child_path)?);
        }

        let name = group_path.rsplit('/').next().unwrap_or("").to_string();
        Ok(Node {
            name,
            group_path,
            schema,
            handle: handle.clone(),
            logger,
            empty,
            children,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_path(&self) -> &str {
        &self.group_path
    }

    pub fn schema(&self) -> &NodeSchema {
        &self.schema
    }

    /// Whether no data has been written to this node yet.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.children.iter()
    }

    /// Pivot tabular rows into an N-D dataset and merge it in. Returns the
    /// dataset as stored after the write.
    pub fn update(&mut self, frame: &Frame) -> Result<Dataset> {
        let pivoted = pivot(&self.schema.dataset, frame)?;
        for warning in &pivoted.warnings {
            self.logger.warning(warning.to_string());
        }
        for note in &pivoted.notes {
            self.logger.warning(note);
        }
        self.update_dense(pivoted.dataset)
    }

    /// Merge a pre-shaped dataset in, skipping the pivot.
    pub fn update_dense(&mut self, update: Dataset) -> Result<Dataset> {
        if update.dims().iter().any(|d| {
            update
                .coord(d)
                .map(CoordValues::is_empty)
                .unwrap_or(true)
        }) {
            return self.dataset();
        }
        if self.empty {
            self.overwrite(&update)?;
            self.empty = false;
        } else {
            self.merge(&update)?;
        }
        let stored = self.dataset()?;
        self.check_duplicates(&stored);
        Ok(stored)
    }

    /// First write: grow every array from zero and write the whole dataset.
    fn overwrite(&self, update: &Dataset) -> Result<()> {
        for coord in &self.schema.dataset.coords {
            let values = update.coord(&coord.name)?;
            let mut array = self.open_array(&coord.name)?;
            array.set_shape(vec![values.len() as u64]);
            array.store_metadata()?;
            if !values.is_empty() {
                let subset =
                    ArraySubset::new_with_start_shape(vec![0], vec![values.len() as u64])?;
                write_coord(&array, &subset, values)?;
            }
        }
        for name in update.var_names() {
            let var = update.var(name)?;
            let mut array = self.open_array(name)?;
            let shape: Vec<u64> = var.values.shape().iter().map(|&n| n as u64).collect();
            array.set_shape(shape.clone());
            array.store_metadata()?;
            if var.values.len() > 0 {
                let subset =
                    ArraySubset::new_with_start_shape(vec![0; shape.len()], shape)?;
                let flat: Vec<f64> = var.values.iter().copied().collect();
                write_f64(&array, &subset, &flat)?;
            }
        }
        self.set_empty_flag(false)
    }

    /// Merge an incoming dataset onto the stored one: interpolate onto the
    /// stored grid, overwrite the rectangular overlap in place, then append
    /// each axis extension in reverse axis order. Values below a sorted
    /// axis minimum cannot be appended and rewrite the node instead.
    fn merge(&self, update: &Dataset) -> Result<()> {
        let existing = self.read_coords()?;
        let interp = interpolate_ds(update, &existing, &self.schema.dataset)?;
        for warning in &interp.warnings {
            self.logger.warning(warning.clone());
        }
        if interp.splits.values().any(|s| s.front > 0) {
            return self.rewrite_merged(&interp, &existing);
        }

        // Dive: per axis, peel the extension off; the remainder converges
        // to the block overlapping the store on every axis at once.
        let dims: Vec<String> = interp.dataset.dims().to_vec();
        let mut overlap = interp.dataset.clone();
        let mut extensions: Vec<(String, Dataset)> = Vec::new();
        for dim in &dims {
            let split = interp.splits[dim].split;
            let len = overlap.coord(dim)?.len();
            extensions.push((dim.clone(), overlap.slice_axis(dim, split..len)?));
            overlap = overlap.slice_axis(dim, 0..split)?;
        }

        for name in overlap.var_names() {
            let var = overlap.var(name)?;
            if var.values.is_empty() {
                continue;
            }
            let start: Vec<u64> = var
                .dims
                .iter()
                .map(|d| interp.splits[d].offset as u64)
                .collect();
            let shape: Vec<u64> = var.values.shape().iter().map(|&n| n as u64).collect();
            let subset = ArraySubset::new_with_start_shape(start, shape)?;
            let flat: Vec<f64> = var.values.iter().copied().collect();
            write_f64(&self.open_array(name)?, &subset, &flat)?;
        }

        // Upward: append extensions in reverse axis order, reindexing each
        // against the other axes' now-final coordinates.
        let mut merged: BTreeMap<String, CoordValues> = existing.coords().clone();
        for (dim, extension) in extensions.into_iter().rev() {
            let added = extension.coord(&dim)?.clone();
            if added.is_empty() {
                continue;
            }
            let mut targets = merged.clone();
            targets.remove(&dim);
            let extension = extension.reindex(&targets)?;
            self.append_axis(&dim, &extension, &merged)?;
            let grown = merged[&dim].concat(&added)?;
            merged.insert(dim, grown);
        }
        Ok(())
    }

    /// Full rewrite: some axis gained values before its existing minimum.
    /// Build the final coordinates, reindex the stored data onto them,
    /// overlay the aligned update and write every array whole.
    fn rewrite_merged(&self, interp: &Interpolated, existing: &Dataset) -> Result<()> {
        let mut targets: BTreeMap<String, CoordValues> = BTreeMap::new();
        for dim in interp.dataset.dims() {
            let plan = interp.splits[dim];
            let merged = interp.dataset.coord(dim)?;
            let front = merged.take(&(0..plan.front).collect::<Vec<_>>());
            let tail_start = plan.front + plan.split;
            let tail = merged.take(&(tail_start..merged.len()).collect::<Vec<_>>());
            targets.insert(dim.clone(), front.concat(existing.coord(dim)?)?.concat(&tail)?);
        }

        let stored = self.dataset()?;
        let mut base = stored.reindex(&targets)?;
        for name in interp.dataset.var_names() {
            let var = interp.dataset.var(name)?;
            let maps: Vec<Vec<usize>> = var
                .dims
                .iter()
                .map(|d| -> Result<Vec<usize>> {
                    let positions = targets[d].positions();
                    let coord = interp.dataset.coord(d)?;
                    (0..coord.len())
                        .map(|i| {
                            positions.get(&coord.key_at(i)).copied().ok_or_else(|| {
                                TreeError::merge(format!(
                                    "aligned value missing from final axis '{d}'"
                                ))
                            })
                        })
                        .collect()
                })
                .collect::<Result<_>>()?;
            let slot = base.var_mut(name)?;
            for (idx, &value) in var.values.indexed_iter() {
                let target: Vec<usize> =
                    (0..var.dims.len()).map(|k| maps[k][idx[k]]).collect();
                slot.values[ndarray::IxDyn(&target)] = value;
            }
        }
        self.overwrite(&base)
    }

    /// Append one axis extension: grow the coordinate array and every
    /// variable over the axis, then write the new block.
    fn append_axis(
        &self,
        dim: &str,
        extension: &Dataset,
        merged: &BTreeMap<String, CoordValues>,
    ) -> Result<()> {
        let added = extension.coord(dim)?;
        let base = merged[dim].len() as u64;

        let mut coord_array = self.open_array(dim)?;
        coord_array.set_shape(vec![base + added.len() as u64]);
        coord_array.store_metadata()?;
        let subset = ArraySubset::new_with_start_shape(vec![base], vec![added.len() as u64])?;
        write_coord(&coord_array, &subset, added)?;

        for name in extension.var_names() {
            let var = extension.var(name)?;
            if !var.dims.iter().any(|d| d == dim) {
                continue;
            }
            let mut array = self.open_array(name)?;
            let shape: Vec<u64> = var
                .dims
                .iter()
                .zip(var.values.shape())
                .map(|(d, &n)| {
                    if d == dim {
                        base + n as u64
                    } else {
                        n as u64
                    }
                })
                .collect();
            array.set_shape(shape);
            array.store_metadata()?;
            let start: Vec<u64> = var
                .dims
                .iter()
                .map(|d| if d == dim { base } else { 0 })
                .collect();
            let block: Vec<u64> = var.values.shape().iter().map(|&n| n as u64).collect();
            let subset = ArraySubset::new_with_start_shape(start, block)?;
            let flat: Vec<f64> = var.values.iter().copied().collect();
            write_f64(&array, &subset, &flat)?;
        }
        Ok(())
    }

    /// Read the stored dataset in full.
    pub fn dataset(&self) -> Result<Dataset> {
        let mut out = self.read_coords()?;
        for var in &self.schema.dataset.vars {
            if self
                .schema
                .dataset
                .coord(&var.name)
                .map(|c| !c.is_composite())
                .unwrap_or(false)
            {
                continue;
            }
            let array = self.open_array(&var.name)?;
            let shape: Vec<usize> = array.shape().iter().map(|&n| n as usize).collect();
            let values = read_f64_all(&array)?;
            let values = ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&shape), values)
                .map_err(|e| TreeError::zarr(e.to_string()))?;
            let dims = self.var_dims(&var.name)?;
            out.add_var(&var.name, dims, values)?;
        }
        Ok(out)
    }

    /// Read only the coordinate arrays.
    fn read_coords(&self) -> Result<Dataset> {
        let mut out = Dataset::new();
        for coord in &self.schema.dataset.coords {
            let array = self.open_array(&coord.name)?;
            out.add_coord(&coord.name, read_coord_all(&array)?);
        }
        Ok(out)
    }

    /// Read selected variables as flat rows: one column per axis, one per
    /// variable. All requested variables must share the same axes.
    pub fn read_df(&self, var_names: &[&str], selectors: &[(String, Selector)]) -> Result<Frame> {
        let mut ds = self.dataset()?;
        for (axis, selector) in selectors {
            let coord = ds.coord(axis)?;
            let key = match selector {
                Selector::F64(v) => CoordKey::F64(v.to_bits()),
                Selector::Str(s) => CoordKey::Str(s.clone()),
            };
            let index = coord
                .positions()
                .get(&key)
                .copied()
                .ok_or_else(|| TreeError::NotFound(format!("value on axis '{axis}'")))?;
            ds = ds.slice_axis(axis, index..index + 1)?;
        }

        let first = var_names
            .first()
            .ok_or_else(|| TreeError::NotFound("no variables requested".to_string()))?;
        let dims = ds.var(first)?.dims.clone();
        for name in var_names {
            if ds.var(name)?.dims != dims {
                return Err(TreeError::NotFound(format!(
                    "variable '{name}' does not share axes with '{first}'"
                )));
            }
        }

        let lens: Vec<usize> = dims
            .iter()
            .map(|d| ds.coord(d).map(CoordValues::len))
            .collect::<Result<_>>()?;
        let rows: usize = lens.iter().product();
        let mut strides = vec![1usize; lens.len()];
        for i in (0..lens.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * lens[i + 1];
        }

        let mut frame = Frame::new();
        for (k, dim) in dims.iter().enumerate() {
            let coord = ds.coord(dim)?;
            let column = match coord {
                CoordValues::F64(values) => Column::F64(
                    (0..rows).map(|r| values[r / strides[k] % lens[k]]).collect(),
                ),
                CoordValues::Str(values) => Column::Str(
                    (0..rows)
                        .map(|r| values[r / strides[k] % lens[k]].clone())
                        .collect(),
                ),
            };
            frame = frame.with_column(dim, column)?;
        }
        for name in var_names {
            let values: Vec<f64> = ds.var(name)?.values.iter().copied().collect();
            frame = frame.with_column(name, values)?;
        }
        Ok(frame)
    }

    /// Flush and close this node's logger and all children's.
    pub fn close(&mut self) {
        for child in &mut self.children {
            child.close();
        }
        self.logger.close();
    }

    /// Advisory post-write check: duplicate axis values are reported, never
    /// deduplicated.
    fn check_duplicates(&self, dataset: &Dataset) {
        for dim in dataset.dims() {
            let Ok(coord) = dataset.coord(dim) else { continue };
            let unique = coord.positions().len();
            if unique < coord.len() {
                self.logger.warning(format!(
                    "axis '{dim}' holds {} duplicate coordinate values after merge",
                    coord.len() - unique
                ));
            }
        }
    }

    fn var_dims(&self, name: &str) -> Result<Vec<String>> {
        let var = self
            .schema
            .dataset
            .var(name)
            .ok_or_else(|| TreeError::NotFound(format!("variable '{name}'")))?;
        // A composite constituent collapses onto its composite axis.
        for coord in &self.schema.dataset.coords {
            if coord.is_composite() && coord.composed.contains(&var.name) {
                return Ok(vec![coord.name.clone()]);
            }
        }
        Ok(var.coords.clone())
    }

    fn open_array(&self, name: &str) -> Result<ZarrArray> {
        let path = array_path(&self.group_path, name);
        Ok(Array::open(self.handle.store.clone(), &path)?)
    }

    fn set_empty_flag(&self, value: bool) -> Result<()> {
        let mut group = Group::open(self.handle.store.clone(), &group_zarr_path(&self.group_path))
            .map_err(|e| TreeError::zarr(e.to_string()))?;
        group
            .attributes_mut()
            .insert(ATTR_EMPTY.to_string(), serde_json::json!(value));
        group
            .store_metadata()
            .map_err(|e| TreeError::zarr(e.to_string()))?;
        Ok(())
    }
}

/// Create the group and its zero-length arrays for a schema node.
fn materialize(handle: &StoreHandle, schema: &NodeSchema, group_path: &str) -> Result<()> {
    let mut attrs = serde_json::Map::new();
    attrs.insert(
        ATTR_STRUCTURE.to_string(),
        serde_json::json!(schema::serialize(schema)?),
    );
    attrs.insert(ATTR_EMPTY.to_string(), serde_json::json!(true));
    let group = GroupBuilder::new()
        .attributes(attrs)
        .build(handle.store.clone(), &group_zarr_path(group_path))
        .map_err(|e| TreeError::zarr(e.to_string()))?;
    group
        .store_metadata()
        .map_err(|e| TreeError::zarr(e.to_string()))?;

    for coord in &schema.dataset.coords {
        let dtype = coord_dtype(&schema.dataset, coord);
        let mut attrs = serde_json::Map::new();
        attrs.insert("composed".to_string(), serde_json::json!(coord.composed));
        attrs.insert("chunk_size".to_string(), serde_json::json!(coord.chunk_size));
        if !coord.description.is_empty() {
            attrs.insert("description".to_string(), serde_json::json!(coord.description));
        }
        build_array(
            handle,
            &array_path(group_path, &coord.name),
            vec![0],
            vec![coord.chunk_size],
            &dtype,
            attrs,
        )?;
    }
    for var in &schema.dataset.vars {
        if schema
            .dataset
            .coord(&var.name)
            .map(|c| !c.is_composite())
            .unwrap_or(false)
        {
            // Backing field of a plain axis is stored as the coordinate.
            continue;
        }
        let dims = var_storage_dims(&schema.dataset, var.name.as_str(), &var.coords);
        let chunks: Vec<u64> = dims
            .iter()
            .map(|d| {
                schema
                    .dataset
                    .coord(d)
                    .map(|c| c.chunk_size)
                    .unwrap_or(1024)
            })
            .collect();
        let mut attrs = serde_json::Map::new();
        attrs.insert("dims".to_string(), serde_json::json!(dims));
        if let UnitSpec::Physical(unit) = &var.unit {
            attrs.insert("unit".to_string(), serde_json::json!(unit.spec()));
        }
        if !var.description.is_empty() {
            attrs.insert("description".to_string(), serde_json::json!(var.description));
        }
        build_array(
            handle,
            &array_path(group_path, &var.name),
            vec![0; dims.len()],
            chunks,
            &storage_dtype(var),
            attrs,
        )?;
    }
    Ok(())
}

/// Verify an existing group against the schema; materialize the dataset if
/// the group carries no structure marker yet. Returns the empty flag.
fn reconcile(handle: &StoreHandle, schema: &NodeSchema, group_path: &str) -> Result<bool> {
    let attrs = read_group_attrs(handle, group_path)?.unwrap_or_default();
    let Some(text) = attrs.get(ATTR_STRUCTURE).and_then(|v| v.as_str()) else {
        materialize(handle, schema, group_path)?;
        return Ok(true);
    };
    let (stored, _) = schema::deserialize(text, group_path)?;
    if !stored.dataset.structure_eq(&schema.dataset) {
        return Err(TreeError::StructureMismatch {
            node: group_path.to_string(),
            detail: "stored coordinates or variables differ from the schema".to_string(),
        });
    }
    Ok(attrs
        .get(ATTR_EMPTY)
        .and_then(|v| v.as_bool())
        .unwrap_or(false))
}

fn read_group_attrs(
    handle: &StoreHandle,
    group_path: &str,
) -> Result<Option<serde_json::Map<String, serde_json::Value>>> {
    match probe(&handle.store, group_path)? {
        EntryKind::Group => {
            let group = Group::open(handle.store.clone(), &group_zarr_path(group_path))
                .map_err(|e| TreeError::zarr(e.to_string()))?;
            Ok(Some(group.attributes().clone()))
        }
        _ => Ok(None),
    }
}

fn build_array(
    handle: &StoreHandle,
    path: &str,
    shape: Vec<u64>,
    chunks: Vec<u64>,
    dtype: &DType,
    attrs: serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    let chunk_grid: zarrs::array::ChunkGrid = chunks
        .try_into()
        .map_err(|e| TreeError::zarr(format!("{e:?}")))?;
    let array = ArrayBuilder::new(shape, dtype.data_type(), chunk_grid, dtype.fill_value())
        .attributes(attrs)
        .build(handle.store.clone(), path)?;
    array.store_metadata()?;
    Ok(())
}

/// Data type of a coordinate array: composite axes store the hashed index,
/// datetime axes store ticks, otherwise the backing variable's dtype.
fn coord_dtype(schema: &DatasetSchema, coord: &Coord) -> DType {
    if coord.is_composite() {
        return DType::Int(64);
    }
    schema
        .var(&coord.composed[0])
        .map(storage_dtype)
        .unwrap_or(DType::Float(64))
}

/// Storage dtype of a variable; datetimes persist as integer ticks.
fn storage_dtype(var: &crate::schema::Variable) -> DType {
    if matches!(var.unit, UnitSpec::DateTime(_)) {
        DType::Int(64)
    } else {
        var.dtype.clone()
    }
}

fn var_storage_dims(schema: &DatasetSchema, name: &str, declared: &[String]) -> Vec<String> {
    for coord in &schema.coords {
        if coord.is_composite() && coord.composed.iter().any(|f| f == name) {
            return vec![coord.name.clone()];
        }
    }
    declared.to_vec()
}

fn join_path(group_path: &str, name: &str) -> String {
    if group_path.is_empty() {
        name.to_string()
    } else {
        format!("{group_path}/{name}")
    }
}

fn group_zarr_path(group_path: &str) -> String {
    if group_path.is_empty() {
        "/".to_string()
    } else {
        format!("/{group_path}")
    }
}

fn array_path(group_path: &str, name: &str) -> String {
    if group_path.is_empty() {
        format!("/{name}")
    } else {
        format!("/{group_path}/{name}")
    }
}

/// Read a whole array into the `f64` working representation; integer NA
/// sentinels come back as NaN.
fn read_f64_all(array: &ZarrArray) -> Result<Vec<f64>> {
    let shape = array.shape().to_vec();
    if shape.iter().any(|&n| n == 0) {
        return Ok(Vec::new());
    }
    let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape)?;
    let values = match array.data_type() {
        DataType::Float64 => array.retrieve_array_subset_elements::<f64>(&subset)?,
        DataType::Float32 => array
            .retrieve_array_subset_elements::<f32>(&subset)?
            .into_iter()
            .map(f64::from)
            .collect(),
        DataType::Int64 => array
            .retrieve_array_subset_elements::<i64>(&subset)?
            .into_iter()
            .map(|v| if v == i64::MIN { f64::NAN } else { v as f64 })
            .collect(),
        DataType::Int32 => array
            .retrieve_array_subset_elements::<i32>(&subset)?
            .into_iter()
            .map(|v| if v == i32::MIN { f64::NAN } else { f64::from(v) })
            .collect(),
        DataType::Int16 => array
            .retrieve_array_subset_elements::<i16>(&subset)?
            .into_iter()
            .map(|v| if v == i16::MIN { f64::NAN } else { f64::from(v) })
            .collect(),
        DataType::Int8 => array
            .retrieve_array_subset_elements::<i8>(&subset)?
            .into_iter()
            .map(|v| if v == i8::MIN { f64::NAN } else { f64::from(v) })
            .collect(),
        DataType::Bool => array
            .retrieve_array_subset_elements::<bool>(&subset)?
            .into_iter()
            .map(|v| if v { 1.0 } else { 0.0 })
            .collect(),
        other => {
            return Err(TreeError::zarr(format!(
                "unsupported stored data type {other}"
            )))
        }
    };
    Ok(values)
}

/// Read a whole coordinate array.
fn read_coord_all(array: &ZarrArray) -> Result<CoordValues> {
    if matches!(array.data_type(), DataType::String) {
        let len = array.shape()[0];
        if len == 0 {
            return Ok(CoordValues::Str(Vec::new()));
        }
        let subset = ArraySubset::new_with_start_shape(vec![0], vec![len])?;
        let values = array.retrieve_array_subset_elements::<String>(&subset)?;
        return Ok(CoordValues::Str(values));
    }
    Ok(CoordValues::F64(read_f64_all(array)?))
}

/// Write working values into an array, narrowing to the stored data type;
/// NaN maps to the dtype's NA sentinel.
fn write_f64(array: &ZarrArray, subset: &ArraySubset, values: &[f64]) -> Result<()> {
    match array.data_type() {
        DataType::Float64 => array.store_array_subset_elements(subset, values)?,
        DataType::Float32 => {
            let data: Vec<f32> = values.iter().map(|&v| v as f32).collect();
            array.store_array_subset_elements(subset, &data)?;
        }
        DataType::Int64 => {
            let data: Vec<i64> = values
                .iter()
                .map(|&v| if v.is_nan() { i64::MIN } else { v as i64 })
                .collect();
            array.store_array_subset_elements(subset, &data)?;
        }
        DataType::Int32 => {
            let data: Vec<i32> = values
                .iter()
                .map(|&v| if v.is_nan() { i32::MIN } else { v as i32 })
                .collect();
            array.store_array_subset_elements(subset, &data)?;
        }
        DataType::Int16 => {
            let data: Vec<i16> = values
                .iter()
                .map(|&v| if v.is_nan() { i16::MIN } else { v as i16 })
                .collect();
            array.store_array_subset_elements(subset, &data)?;
        }
        DataType::Int8 => {
            let data: Vec<i8> = values
                .iter()
                .map(|&v| if v.is_nan() { i8::MIN } else { v as i8 })
                .collect();
            array.store_array_subset_elements(subset, &data)?;
        }
        DataType::Bool => {
            let data: Vec<bool> = values.iter().map(|&v| v != 0.0).collect();
            array.store_array_subset_elements(subset, &data)?;
        }
        other => {
            return Err(TreeError::zarr(format!(
                "unsupported stored data type {other}"
            )))
        }
    }
    Ok(())
}

/// Write coordinate values, dispatching on the value kind.
fn write_coord(array: &ZarrArray, subset: &ArraySubset, values: &CoordValues) -> Result<()> {
    match values {
        CoordValues::F64(v) => write_f64(array, subset, v),
        CoordValues::Str(v) => {
            array.store_array_subset_elements(subset, v)?;
            Ok(())
        }
    }
}
