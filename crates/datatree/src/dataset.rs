//! In-memory N-dimensional dataset.
//!
//! A [`Dataset`] is the working form between the tabular input and the
//! chunked store: named axes with 1-D coordinate values and variables as
//! `f64` arrays over an ordered subset of those axes. All numeric values,
//! including integer and datetime-tick coordinates, live in `f64` here;
//! dtypes narrow the representation only at the store boundary.

use std::collections::BTreeMap;

use ndarray::{ArrayD, Axis, IxDyn};

use crate::error::{Result, TreeError};

/// Values of one coordinate axis.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordValues {
    F64(Vec<f64>),
    Str(Vec<String>),
}

impl CoordValues {
    pub fn len(&self) -> usize {
        match self {
            CoordValues::F64(v) => v.len(),
            CoordValues::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reorder by an index permutation (indices into `self`).
    pub fn take(&self, indices: &[usize]) -> CoordValues {
        match self {
            CoordValues::F64(v) => CoordValues::F64(indices.iter().map(|&i| v[i]).collect()),
            CoordValues::Str(v) => {
                CoordValues::Str(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }

    /// Concatenate two coordinate value lists of the same kind.
    pub fn concat(&self, other: &CoordValues) -> Result<CoordValues> {
        match (self, other) {
            (CoordValues::F64(a), CoordValues::F64(b)) => {
                Ok(CoordValues::F64(a.iter().chain(b).copied().collect()))
            }
            (CoordValues::Str(a), CoordValues::Str(b)) => {
                Ok(CoordValues::Str(a.iter().chain(b).cloned().collect()))
            }
            _ => Err(TreeError::merge("coordinate value kinds differ")),
        }
    }

    /// Position of each value, keyed for exact lookup. `f64` values key by
    /// bit pattern, so lookups only hit values written from the same source.
    pub fn positions(&self) -> BTreeMap<CoordKey, usize> {
        let mut map = BTreeMap::new();
        match self {
            CoordValues::F64(v) => {
                for (i, x) in v.iter().enumerate() {
                    map.entry(CoordKey::F64(x.to_bits())).or_insert(i);
                }
            }
            CoordValues::Str(v) => {
                for (i, s) in v.iter().enumerate() {
                    map.entry(CoordKey::Str(s.clone())).or_insert(i);
                }
            }
        }
        map
    }

    /// Lookup key of the value at `index`.
    pub fn key_at(&self, index: usize) -> CoordKey {
        match self {
            CoordValues::F64(v) => CoordKey::F64(v[index].to_bits()),
            CoordValues::Str(v) => CoordKey::Str(v[index].clone()),
        }
    }

    /// Numeric view, or an error for string axes.
    pub fn as_f64(&self, name: &str) -> Result<&[f64]> {
        match self {
            CoordValues::F64(v) => Ok(v),
            CoordValues::Str(_) => Err(TreeError::merge(format!(
                "axis '{name}' holds strings where numeric values are required"
            ))),
        }
    }
}

/// Exact-match key into coordinate values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoordKey {
    F64(u64),
    Str(String),
}

/// One variable: an `f64` array over an ordered list of axes.
#[derive(Debug, Clone, PartialEq)]
pub struct VarData {
    pub dims: Vec<String>,
    pub values: ArrayD<f64>,
}

/// Named axes with coordinates and variables over them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    dims: Vec<String>,
    coords: BTreeMap<String, CoordValues>,
    vars: BTreeMap<String, VarData>,
}

impl Dataset {
    pub fn new() -> Dataset {
        Dataset::default()
    }

    /// Declare an axis with its coordinate values. Axis order is the order
    /// of insertion.
    pub fn add_coord(&mut self, name: &str, values: CoordValues) {
        if !self.dims.iter().any(|d| d == name) {
            self.dims.push(name.to_string());
        }
        self.coords.insert(name.to_string(), values);
    }

    /// Add a variable; its dims must all be declared axes and its element
    /// count must match the axis lengths.
    pub fn add_var(&mut self, name: &str, dims: Vec<String>, values: ArrayD<f64>) -> Result<()> {
        let expected: Vec<usize> = dims
            .iter()
            .map(|d| {
                self.coords
                    .get(d)
                    .map(CoordValues::len)
                    .ok_or_else(|| TreeError::merge(format!("variable '{name}' uses undeclared axis '{d}'")))
            })
            .collect::<Result<_>>()?;
        if values.shape() != expected.as_slice() {
            return Err(TreeError::merge(format!(
                "variable '{name}' shape {:?} does not match axes {:?}",
                values.shape(),
                expected
            )));
        }
        self.vars.insert(name.to_string(), VarData { dims, values });
        Ok(())
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn coord(&self, name: &str) -> Result<&CoordValues> {
        self.coords
            .get(name)
            .ok_or_else(|| TreeError::NotFound(format!("coordinate '{name}'")))
    }

    pub fn var(&self, name: &str) -> Result<&VarData> {
        self.vars
            .get(name)
            .ok_or_else(|| TreeError::NotFound(format!("variable '{name}'")))
    }

    pub fn var_mut(&mut self, name: &str) -> Result<&mut VarData> {
        self.vars
            .get_mut(name)
            .ok_or_else(|| TreeError::NotFound(format!("variable '{name}'")))
    }

    pub fn var_names(&self) -> Vec<&str> {
        self.vars.keys().map(String::as_str).collect()
    }

    pub fn coords(&self) -> &BTreeMap<String, CoordValues> {
        &self.coords
    }

    /// Reorder one axis of every variable (and its coordinate) by an index
    /// permutation into the current order.
    pub fn take_along(&mut self, axis: &str, indices: &[usize]) -> Result<()> {
        let coord = self.coord(axis)?.take(indices);
        self.coords.insert(axis.to_string(), coord);
        for var in self.vars.values_mut() {
            if let Some(pos) = var.dims.iter().position(|d| d == axis) {
                var.values = var.values.select(Axis(pos), indices);
            }
        }
        Ok(())
    }

    /// Restrict one axis to an index range; variables without the axis are
    /// untouched.
    pub fn slice_axis(&self, axis: &str, range: std::ops::Range<usize>) -> Result<Dataset> {
        let indices: Vec<usize> = range.collect();
        let mut out = Dataset::new();
        for dim in &self.dims {
            let coord = self.coord(dim)?;
            if dim == axis {
                out.add_coord(dim, coord.take(&indices));
            } else {
                out.add_coord(dim, coord.clone());
            }
        }
        for (name, var) in &self.vars {
            let values = match var.dims.iter().position(|d| d == axis) {
                Some(pos) => var.values.select(Axis(pos), &indices),
                None => var.values.clone(),
            };
            out.add_var(name, var.dims.clone(), values)?;
        }
        Ok(out)
    }

    /// Reindex every variable onto new coordinates, filling positions with
    /// no source value with NaN. Axes absent from `targets` keep their
    /// current coordinates.
    pub fn reindex(&self, targets: &BTreeMap<String, CoordValues>) -> Result<Dataset> {
        let mut out = Dataset::new();
        // index map per axis: target position -> source position
        let mut maps: BTreeMap<String, Vec<Option<usize>>> = BTreeMap::new();
        for dim in &self.dims {
            let source = self.coord(dim)?;
            let target = targets.get(dim).unwrap_or(source);
            let positions = source.positions();
            let map: Vec<Option<usize>> = (0..target.len())
                .map(|i| positions.get(&target.key_at(i)).copied())
                .collect();
            out.add_coord(dim, target.clone());
            maps.insert(dim.clone(), map);
        }
        for (name, var) in &self.vars {
            let shape: Vec<usize> = var.dims.iter().map(|d| maps[d].len()).collect();
            let mut values = ArrayD::from_elem(IxDyn(&shape), f64::NAN);
            for (target_index, slot) in values.indexed_iter_mut() {
                let source_index: Option<Vec<usize>> = var
                    .dims
                    .iter()
                    .enumerate()
                    .map(|(k, d)| maps[d][target_index[k]])
                    .collect();
                if let Some(idx) = source_index {
                    *slot = var.values[IxDyn(&idx)];
                }
            }
            out.add_var(name, var.dims.clone(), values)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn simple() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_coord("t", CoordValues::F64(vec![1.0, 2.0, 3.0]));
        ds.add_coord("x", CoordValues::Str(vec!["a".into(), "b".into()]));
        ds.add_var(
            "q",
            vec!["t".into(), "x".into()],
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]].into_dyn(),
        )
        .unwrap();
        ds
    }

    #[test]
    fn test_shape_check() {
        let mut ds = simple();
        let err = ds.add_var(
            "bad",
            vec!["t".into()],
            array![[1.0, 2.0]].into_dyn(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_take_along() {
        let mut ds = simple();
        ds.take_along("t", &[2, 0, 1]).unwrap();
        assert_eq!(ds.coord("t").unwrap(), &CoordValues::F64(vec![3.0, 1.0, 2.0]));
        assert_eq!(ds.var("q").unwrap().values[[0, 0]], 5.0);
        assert_eq!(ds.var("q").unwrap().values[[1, 1]], 2.0);
    }

    #[test]
    fn test_reindex_fills_missing() {
        let ds = simple();
        let mut targets = BTreeMap::new();
        targets.insert("t".to_string(), CoordValues::F64(vec![2.0, 4.0]));
        let out = ds.reindex(&targets).unwrap();
        let q = &out.var("q").unwrap().values;
        assert_eq!(q.shape(), &[2, 2]);
        assert_eq!(q[[0, 0]], 3.0);
        assert!(q[[1, 0]].is_nan());
    }

    #[test]
    fn test_reindex_reorders_strings() {
        let ds = simple();
        let mut targets = BTreeMap::new();
        targets.insert(
            "x".to_string(),
            CoordValues::Str(vec!["b".into(), "a".into()]),
        );
        let out = ds.reindex(&targets).unwrap();
        let q = &out.var("q").unwrap().values;
        assert_eq!(q[[0, 0]], 2.0);
        assert_eq!(q[[0, 1]], 1.0);
    }
}
