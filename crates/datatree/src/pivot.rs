//! Tabular rows to N-dimensional dataset.
//!
//! Each row of the input frame carries one value per source column. Columns
//! map to schema variables via `df_col` and are converted `source_unit` to
//! `unit` up front. Every axis collects its unique per-row values into the
//! coordinate; each row then scatters into its N-D cell through a
//! multi-index. A composite axis replaces the tuple of its constituent
//! values by a single hashed index, so stores without multi-index support
//! can still address the tuple.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use ndarray::{ArrayD, IxDyn};

use crate::dataset::{CoordKey, CoordValues, Dataset};
use crate::dtype::{self, DType, TrimmedCast};
use crate::error::{Result, TreeError};
use crate::frame::{Column, Frame};
use crate::schema::{Coord, DatasetSchema, Variable};
use crate::units::UnitSpec;

/// Hashed composite indices are masked to 53 bits so they stay exact in the
/// `f64` working representation.
const HASH_MASK: u64 = (1 << 53) - 1;

/// Result of a pivot: the dataset plus any lossy-cast warnings and
/// advisory notes (tolerated input defects).
#[derive(Debug)]
pub struct PivotResult {
    pub dataset: Dataset,
    pub warnings: Vec<TrimmedCast>,
    pub notes: Vec<String>,
}

/// Per-row values of one source field after unit conversion.
enum RowValues {
    F64(Vec<f64>),
    Str(Vec<String>),
}

impl RowValues {
    fn key_at(&self, row: usize) -> CoordKey {
        match self {
            RowValues::F64(v) => CoordKey::F64(v[row].to_bits()),
            RowValues::Str(v) => CoordKey::Str(v[row].clone()),
        }
    }
}

/// Pivot a frame into an N-D dataset per the node's dataset schema.
pub fn pivot(schema: &DatasetSchema, frame: &Frame) -> Result<PivotResult> {
    let mut warnings = Vec::new();
    let mut notes = Vec::new();
    let constituents = composite_constituents(schema);

    // Converted per-row values of every field any axis or variable reads.
    // Axis fields must parse; unparsable timestamps elsewhere become NaT.
    let mut fields: BTreeMap<String, RowValues> = BTreeMap::new();
    for var in &schema.vars {
        let axis_field =
            schema.coord(&var.name).is_some() || constituents.contains(&var.name.as_str());
        fields.insert(
            var.name.clone(),
            converted_rows(var, frame, !axis_field, &mut warnings, &mut notes)?,
        );
    }

    // Per axis: coordinate values, and each row's position on the axis.
    let mut dataset = Dataset::new();
    let mut row_positions: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for coord in &schema.coords {
        let axis_rows = axis_rows(coord, &fields, frame.rows())?;
        let (values, positions) = unique_positions(coord, &axis_rows)?;
        if let (CoordValues::F64(v), Some(backing)) = (&values, schema.var(&coord.name)) {
            if !coord.is_composite() {
                let mut cast = v.clone();
                if let Some(w) = dtype::cast_values(&coord.name, &backing.dtype, &mut cast)
                    .map_err(TreeError::DType)?
                {
                    warnings.push(w);
                }
                dataset.add_coord(&coord.name, CoordValues::F64(cast));
                row_positions.insert(coord.name.clone(), positions);
                continue;
            }
        }
        dataset.add_coord(&coord.name, values);
        row_positions.insert(coord.name.clone(), positions);
    }

    // Constituents of composite axes become 1-D variables over the axis.
    // Variables covering every axis scatter with later rows winning.
    for var in &schema.vars {
        if schema.coord(&var.name).map(|c| !c.is_composite()).unwrap_or(false) {
            // Backing field of a plain axis is the coordinate itself.
            continue;
        }
        let dims = var_dims(var, &constituents, schema)?;
        // A variable spanning fewer axes than the dataset must be constant
        // along the omitted ones; rows landing in the same slot must agree.
        let strict = constituents.contains(&var.name.as_str())
            || schema.coords.iter().any(|c| !dims.contains(&c.name));
        let rows = &fields[&var.name];
        let values = scatter(var, &dims, rows, &row_positions, &dataset, strict)?;
        let mut values = values;
        if let Some(w) = cast_array(&var.name, &var.dtype, &mut values)? {
            warnings.push(w);
        }
        dataset.add_var(&var.name, dims, values)?;
    }

    Ok(PivotResult {
        dataset,
        warnings,
        notes,
    })
}

/// Fields that feed a composite axis.
fn composite_constituents(schema: &DatasetSchema) -> Vec<&str> {
    schema
        .coords
        .iter()
        .filter(|c| c.is_composite())
        .flat_map(|c| c.composed.iter().map(String::as_str))
        .collect()
}

/// Dims of a variable in the dataset: a composite constituent collapses to
/// the composite axis alone.
fn var_dims(
    var: &Variable,
    constituents: &[&str],
    schema: &DatasetSchema,
) -> Result<Vec<String>> {
    if constituents.contains(&var.name.as_str()) {
        let axis = schema
            .coords
            .iter()
            .find(|c| c.is_composite() && c.composed.contains(&var.name))
            .map(|c| c.name.clone())
            .ok_or_else(|| TreeError::pivot(format!("no composite axis uses '{}'", var.name)))?;
        return Ok(vec![axis]);
    }
    if var.coords.is_empty() {
        return Err(TreeError::pivot(format!(
            "variable '{}' declares no coordinates",
            var.name
        )));
    }
    Ok(var.coords.clone())
}

/// Read and convert a variable's source column.
fn converted_rows(
    var: &Variable,
    frame: &Frame,
    lenient: bool,
    warnings: &mut Vec<TrimmedCast>,
    notes: &mut Vec<String>,
) -> Result<RowValues> {
    let name = var.source_column();
    let column = frame.column(name)?;
    match (&var.unit, column) {
        (UnitSpec::DateTime(dt), Column::Str(raw)) => {
            let mut ticks = Vec::with_capacity(raw.len());
            let mut unparsable = 0usize;
            for value in raw {
                match dt.parse(value) {
                    Ok(tick) => ticks.push(tick as f64),
                    Err(e) if lenient => {
                        unparsable += 1;
                        ticks.push(crate::units::NAT as f64);
                        if unparsable == 1 {
                            notes.push(format!("column '{name}': {e}, storing NaT"));
                        }
                    }
                    Err(e) => return Err(TreeError::Unit(e)),
                }
            }
            if unparsable > 1 {
                notes.push(format!(
                    "column '{name}': {unparsable} unparsable timestamps stored as NaT"
                ));
            }
            Ok(RowValues::F64(ticks))
        }
        (UnitSpec::DateTime(_), Column::F64(raw)) => Ok(RowValues::F64(raw.clone())),
        (_, Column::Str(raw)) => {
            if var.dtype.category() != crate::dtype::Category::Str {
                return Err(TreeError::pivot(format!(
                    "column '{name}' is text but variable '{}' is {}",
                    var.name, var.dtype
                )));
            }
            let mut values = raw.clone();
            if let DType::Str(max_len) = var.dtype {
                // Labels must be at their stored width before acting as
                // axis values.
                if let Some(w) = dtype::cast_strings(name, max_len, &mut values) {
                    warnings.push(w);
                }
            }
            Ok(RowValues::Str(values))
        }
        (unit, Column::F64(raw)) => {
            let mut values = raw.clone();
            if let (UnitSpec::Physical(target), Some(source)) = (unit, &var.source_unit) {
                source
                    .convert_slice(target, &mut values)
                    .map_err(TreeError::Unit)?;
            }
            Ok(RowValues::F64(values))
        }
    }
}

/// Per-row values of one axis; a composite axis hashes the constituent
/// tuple into a 53-bit index.
fn axis_rows(
    coord: &Coord,
    fields: &BTreeMap<String, RowValues>,
    rows: usize,
) -> Result<RowValues> {
    if !coord.is_composite() {
        let field = &coord.composed[0];
        return match fields.get(field) {
            Some(RowValues::F64(v)) => Ok(RowValues::F64(v.clone())),
            Some(RowValues::Str(v)) => Ok(RowValues::Str(v.clone())),
            None => Err(TreeError::pivot(format!(
                "axis '{}' has no backing variable '{field}'",
                coord.name
            ))),
        };
    }
    let mut hashed = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut hasher = DefaultHasher::new();
        for field in &coord.composed {
            match fields.get(field) {
                Some(RowValues::F64(v)) => v[row].to_bits().hash(&mut hasher),
                Some(RowValues::Str(v)) => v[row].hash(&mut hasher),
                None => {
                    return Err(TreeError::pivot(format!(
                        "composite axis '{}' misses field '{field}'",
                        coord.name
                    )))
                }
            }
        }
        hashed.push((hasher.finish() & HASH_MASK) as f64);
    }
    Ok(RowValues::F64(hashed))
}

/// Unique axis values (sorted ascending or first-appearance order) plus each
/// row's position on the axis.
fn unique_positions(coord: &Coord, rows: &RowValues) -> Result<(CoordValues, Vec<usize>)> {
    match rows {
        RowValues::F64(values) => {
            for v in values {
                if v.is_nan() {
                    return Err(TreeError::pivot(format!(
                        "axis '{}' has a missing coordinate value",
                        coord.name
                    )));
                }
            }
            let mut unique: Vec<f64> = Vec::new();
            let mut index: BTreeMap<u64, usize> = BTreeMap::new();
            for v in values {
                if !index.contains_key(&v.to_bits()) {
                    index.insert(v.to_bits(), unique.len());
                    unique.push(*v);
                }
            }
            if coord.sorted && !coord.is_composite() {
                let mut order: Vec<usize> = (0..unique.len()).collect();
                order.sort_by(|&a, &b| {
                    unique[a]
                        .partial_cmp(&unique[b])
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                let sorted: Vec<f64> = order.iter().map(|&i| unique[i]).collect();
                for (new_pos, &old_pos) in order.iter().enumerate() {
                    index.insert(unique[old_pos].to_bits(), new_pos);
                }
                unique = sorted;
            }
            let positions = values.iter().map(|v| index[&v.to_bits()]).collect();
            Ok((CoordValues::F64(unique), positions))
        }
        RowValues::Str(values) => {
            if coord.sorted {
                return Err(TreeError::pivot(format!(
                    "axis '{}' holds strings and cannot be a sorted axis",
                    coord.name
                )));
            }
            let mut unique: Vec<String> = Vec::new();
            let mut index: BTreeMap<&str, usize> = BTreeMap::new();
            for v in values {
                if !index.contains_key(v.as_str()) {
                    index.insert(v, unique.len());
                    unique.push(v.clone());
                }
            }
            let positions = values.iter().map(|v| index[v.as_str()]).collect();
            Ok((CoordValues::Str(unique), positions))
        }
    }
}

/// Scatter row values into the variable's N-D array. With `strict`, a slot
/// receiving two different values is fatal; otherwise the later row wins.
fn scatter(
    var: &Variable,
    dims: &[String],
    rows: &RowValues,
    row_positions: &BTreeMap<String, Vec<usize>>,
    dataset: &Dataset,
    strict: bool,
) -> Result<ArrayD<f64>> {
    let values = match rows {
        RowValues::F64(v) => v,
        RowValues::Str(_) => {
            return Err(TreeError::pivot(format!(
                "variable '{}' holds strings; only coordinate labels may be text",
                var.name
            )))
        }
    };
    let shape: Vec<usize> = dims
        .iter()
        .map(|d| dataset.coord(d).map(CoordValues::len))
        .collect::<Result<_>>()?;
    let positions: Vec<&Vec<usize>> = dims
        .iter()
        .map(|d| {
            row_positions.get(d).ok_or_else(|| {
                TreeError::pivot(format!(
                    "variable '{}' uses axis '{d}' absent from the update",
                    var.name
                ))
            })
        })
        .collect::<Result<_>>()?;
    let mut array = ArrayD::from_elem(IxDyn(&shape), f64::NAN);
    let mut filled = ArrayD::from_elem(IxDyn(&shape), false);
    for (row, &value) in values.iter().enumerate() {
        let idx: Vec<usize> = positions.iter().map(|p| p[row]).collect();
        let idx = IxDyn(&idx);
        if strict && filled[&idx] {
            let previous = array[&idx];
            let same = (previous.is_nan() && value.is_nan()) || previous == value;
            if !same {
                return Err(TreeError::pivot(format!(
                    "rows disagree on '{}' within one cell: {previous} vs {value}",
                    var.name
                )));
            }
        }
        array[&idx] = value;
        filled[idx] = true;
    }
    Ok(array)
}

fn cast_array(name: &str, dtype: &DType, values: &mut ArrayD<f64>) -> Result<Option<TrimmedCast>> {
    let slice = values
        .as_slice_mut()
        .ok_or_else(|| TreeError::pivot("non-contiguous working array".to_string()))?;
    dtype::cast_values(name, dtype, slice).map_err(TreeError::DType)
}
