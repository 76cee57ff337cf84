//! Coordinate interpolation for merges.
//!
//! An incoming dataset rarely lands exactly on the stored grid. Per axis the
//! merge splits its values into an overlap with the existing coordinates and
//! an extension beyond them. On a sorted axis, overlap values are linearly
//! interpolated onto the existing sub-range they cover; the extension tail
//! is shaped by the axis `step_limits`. On an unsorted axis, overlap must
//! cover the existing values exactly (all or none), in the existing order.

use std::collections::BTreeMap;

use ndarray::{ArrayD, Axis};

use crate::dataset::{CoordValues, Dataset};
use crate::error::{Result, TreeError};
use crate::schema::{Coord, DatasetSchema, StepLimits};
use crate::units::Unit;

/// Per-axis merge plan: where the overlap block lands in the existing axis
/// and where the extension starts in the merged coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSplit {
    /// Values below the existing minimum, inserted before everything else.
    /// A non-zero front cannot be written as an append and forces a full
    /// rewrite of the node.
    pub front: usize,
    /// Offset of the overlap block in the existing coordinate.
    pub offset: usize,
    /// Length of the overlap block; merged indices past `front + split` are
    /// the tail extension.
    pub split: usize,
}

/// The incoming dataset aligned onto the store grid.
#[derive(Debug)]
pub struct Interpolated {
    pub dataset: Dataset,
    pub splits: BTreeMap<String, AxisSplit>,
    pub warnings: Vec<String>,
}

/// Permutation ordering incoming axis values for a merge, plus the count of
/// ordered values that overlap the existing range.
///
/// Sorted axes order ascending; the overlap counts values up to and
/// including the first value at or beyond the existing maximum. Unsorted
/// axes put values already present first, in the existing order, and demand
/// the overlap be all of the existing values or none of them.
pub fn sort_by_coord(
    new: &CoordValues,
    old: &CoordValues,
    coord: &Coord,
) -> Result<(Vec<usize>, usize)> {
    if coord.sorted {
        let values = new.as_f64(&coord.name)?;
        let old_values = old.as_f64(&coord.name)?;
        let mut perm: Vec<usize> = (0..values.len()).collect();
        perm.sort_by(|&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if old_values.is_empty() {
            return Ok((perm, 0));
        }
        let max_old = old_values
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let below = perm.iter().filter(|&&i| values[i] < max_old).count();
        let split = (below + 1).min(values.len());
        Ok((perm, split))
    } else {
        let positions = old.positions();
        let old_len = old.len();
        let mut keys: Vec<usize> = (0..new.len())
            .map(|i| {
                positions
                    .get(&new.key_at(i))
                    .copied()
                    .unwrap_or(old_len + i)
            })
            .collect();
        let mut perm: Vec<usize> = (0..new.len()).collect();
        perm.sort_by_key(|&i| keys[i]);
        keys.sort_unstable();
        let split = keys.iter().filter(|&&k| k < old_len).count();
        if split > 0 && split < old_len {
            return Err(TreeError::merge(format!(
                "axis '{}': overlap of {split} values covers only part of the {old_len} existing, \
                 unsorted axes must be updated whole or extended only",
                coord.name
            )));
        }
        Ok((perm, split))
    }
}

/// Merged coordinate of one axis: the existing sub-range the overlap covers,
/// then the accepted extension tail.
pub fn interpolate_coord(
    new_sorted: &CoordValues,
    old: &CoordValues,
    split: usize,
    coord: &Coord,
    axis_step_unit: &Unit,
    warnings: &mut Vec<String>,
) -> Result<(CoordValues, AxisSplit)> {
    if coord.sorted {
        let values = new_sorted.as_f64(&coord.name)?;
        let old_values = old.as_f64(&coord.name)?;
        let max_old = old_values
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);

        // Values below the existing minimum have no grid to interpolate
        // onto; they are inserted before the existing axis instead.
        let overlap = &values[..split.min(values.len())];
        let min_old = old_values.first().copied().unwrap_or(f64::NEG_INFINITY);
        let front: &[f64] = &overlap[..overlap.partition_point(|&v| v < min_old)];
        let (offset, old_part): (usize, &[f64]) = if overlap.is_empty() {
            (0, &[])
        } else {
            let lo = old_values.partition_point(|&v| v < overlap[0]);
            let hi = old_values.partition_point(|&v| v <= overlap[overlap.len() - 1]);
            (lo, &old_values[lo..hi])
        };

        // The first value beyond the existing maximum sits in the overlap
        // for interpolation but still starts the extension.
        let mut extension_start = split.min(values.len());
        if overlap.last().is_some_and(|&v| v > max_old) {
            extension_start -= 1;
        }
        let tail = &values[extension_start..];

        let front: Vec<f64> = match &coord.step_limits {
            StepLimits::Forbid if !front.is_empty() => {
                warnings.push(format!(
                    "axis '{}': extension forbidden, dropping {} values below the existing range",
                    coord.name,
                    front.len()
                ));
                Vec::new()
            }
            _ => front.to_vec(),
        };

        let accepted: Vec<f64> = match &coord.step_limits {
            StepLimits::Forbid => {
                // The boundary value survives only when it interpolates
                // onto an overlapped existing point.
                let retained =
                    usize::from(extension_start < split.min(values.len()) && !old_part.is_empty());
                let dropped = tail.len() - retained;
                if dropped > 0 {
                    warnings.push(format!(
                        "axis '{}': extension forbidden, dropping {} of {} new values",
                        coord.name,
                        dropped,
                        tail.len()
                    ));
                }
                Vec::new()
            }
            StepLimits::Unlimited => tail.to_vec(),
            StepLimits::Range { min, max, unit } => {
                let mut range = [*min, *max];
                if let Some(unit) = unit {
                    unit.convert_slice(axis_step_unit, &mut range)
                        .map_err(TreeError::Unit)?;
                }
                if tail.is_empty() {
                    Vec::new()
                } else {
                    // Seed spacing from the last existing value so the gap
                    // at the seam is regularized too; the seed itself is
                    // not re-appended.
                    let mut seeded = Vec::with_capacity(tail.len() + 1);
                    let seeds = match old_values.last() {
                        Some(&last_old) if last_old < tail[0] => {
                            seeded.push(last_old);
                            1
                        }
                        _ => 0,
                    };
                    seeded.extend_from_slice(tail);
                    let grid = adjust_grid(&seeded, range[0], range[1]);
                    grid[seeds..].to_vec()
                }
            }
        };

        let merged: Vec<f64> = front
            .iter()
            .chain(old_part)
            .chain(&accepted)
            .copied()
            .collect();
        Ok((
            CoordValues::F64(merged),
            AxisSplit {
                front: front.len(),
                offset,
                split: old_part.len(),
            },
        ))
    } else {
        let overlap = if split > 0 {
            // Full overlap, already verified to equal the existing values.
            old.clone()
        } else {
            match old {
                CoordValues::F64(_) => CoordValues::F64(Vec::new()),
                CoordValues::Str(_) => CoordValues::Str(Vec::new()),
            }
        };
        let tail = new_sorted.take(&(split..new_sorted.len()).collect::<Vec<_>>());
        let accepted = match &coord.step_limits {
            StepLimits::Forbid => {
                if !tail.is_empty() {
                    warnings.push(format!(
                        "axis '{}': extension forbidden, dropping {} new values",
                        coord.name,
                        tail.len()
                    ));
                }
                match &tail {
                    CoordValues::F64(_) => CoordValues::F64(Vec::new()),
                    CoordValues::Str(_) => CoordValues::Str(Vec::new()),
                }
            }
            StepLimits::Unlimited => tail,
            StepLimits::Range { .. } => {
                return Err(TreeError::merge(format!(
                    "axis '{}': spacing limits require a sorted axis",
                    coord.name
                )))
            }
        };
        let split_len = overlap.len();
        Ok((
            overlap.concat(&accepted)?,
            AxisSplit {
                front: 0,
                offset: 0,
                split: split_len,
            },
        ))
    }
}

/// Regularize an ascending grid so consecutive gaps lie within
/// `[min_step, max_step]`: undersize gaps drop the point, oversize gaps are
/// subdivided evenly.
pub fn adjust_grid(values: &[f64], min_step: f64, max_step: f64) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted.dedup();
    let Some(&first) = sorted.first() else {
        return Vec::new();
    };
    let mut out = vec![first];
    let mut last = first;
    for &x in &sorted[1..] {
        let gap = x - last;
        if gap < min_step {
            continue;
        }
        if gap > max_step {
            let n = (gap / max_step).ceil() as usize;
            let step = gap / n as f64;
            for k in 1..n {
                out.push(last + k as f64 * step);
            }
        }
        out.push(x);
        last = x;
    }
    out
}

/// Align an incoming dataset onto the existing grid: order each axis,
/// compute the merged coordinates, and linearly interpolate values of sorted
/// axes onto them. Positions outside the incoming range stay NaN.
pub fn interpolate_ds(
    update: &Dataset,
    existing: &Dataset,
    schema: &DatasetSchema,
) -> Result<Interpolated> {
    let mut warnings = Vec::new();
    let mut sorted_update = update.clone();
    let mut plans: BTreeMap<String, usize> = BTreeMap::new();

    for dim in update.dims().to_vec() {
        let coord = schema
            .coord(&dim)
            .ok_or_else(|| TreeError::merge(format!("axis '{dim}' is not in the schema")))?;
        let (perm, split) = sort_by_coord(update.coord(&dim)?, existing.coord(&dim)?, coord)?;
        sorted_update.take_along(&dim, &perm)?;
        plans.insert(dim.clone(), split);
    }

    let mut merged: BTreeMap<String, CoordValues> = BTreeMap::new();
    let mut splits: BTreeMap<String, AxisSplit> = BTreeMap::new();
    for dim in sorted_update.dims().to_vec() {
        let coord = schema.coord(&dim).ok_or_else(|| {
            TreeError::merge(format!("axis '{dim}' is not in the schema"))
        })?;
        let step_unit = schema
            .var(&dim)
            .map(|v| v.unit.step_unit())
            .unwrap_or_else(Unit::dimensionless);
        let (values, axis_split) = interpolate_coord(
            sorted_update.coord(&dim)?,
            existing.coord(&dim)?,
            plans[&dim],
            coord,
            &step_unit,
            &mut warnings,
        )?;
        merged.insert(dim.clone(), values);
        splits.insert(dim.clone(), axis_split);
    }

    // Interpolate variable values of sorted axes onto the merged grid;
    // unsorted axes only reorder, handled by the permutation above.
    let mut out = Dataset::new();
    for dim in sorted_update.dims() {
        out.add_coord(dim, merged[dim].clone());
    }
    for name in sorted_update.var_names() {
        let var = sorted_update.var(name)?;
        let mut values = var.values.clone();
        for (axis, dim) in var.dims.iter().enumerate() {
            let coord = schema
                .coord(dim)
                .ok_or_else(|| TreeError::merge(format!("axis '{dim}' is not in the schema")))?;
            if coord.sorted {
                let source = sorted_update.coord(dim)?.as_f64(dim)?;
                let target = merged[dim].as_f64(dim)?;
                values = interp_axis(&values, axis, source, target);
            } else {
                // Full-overlap order equals the existing order; extension
                // rows keep their incoming order. Dropped tails trim here.
                let keep = merged[dim].len();
                if values.shape()[axis] > keep {
                    let indices: Vec<usize> = (0..keep).collect();
                    values = values.select(Axis(axis), &indices);
                }
            }
        }
        out.add_var(name, var.dims.clone(), values)?;
    }

    Ok(Interpolated {
        dataset: out,
        splits,
        warnings,
    })
}

/// Linear interpolation of one axis from `source` to `target` coordinates;
/// targets outside the source range become NaN, exact hits copy through.
fn interp_axis(values: &ArrayD<f64>, axis: usize, source: &[f64], target: &[f64]) -> ArrayD<f64> {
    // (left index, right index, right weight) per target position
    let stencil: Vec<Option<(usize, usize, f64)>> = target
        .iter()
        .map(|&t| {
            if source.is_empty() {
                return None;
            }
            let hi = source.partition_point(|&s| s < t);
            if hi == 0 {
                return (source[0] == t).then_some((0, 0, 0.0));
            }
            if hi == source.len() {
                let last = source.len() - 1;
                return (source[last] == t).then_some((last, last, 0.0));
            }
            if source[hi] == t {
                return Some((hi, hi, 0.0));
            }
            let lo = hi - 1;
            let w = (t - source[lo]) / (source[hi] - source[lo]);
            Some((lo, hi, w))
        })
        .collect();

    let mut shape = values.shape().to_vec();
    shape[axis] = target.len();
    let mut out = ArrayD::from_elem(ndarray::IxDyn(&shape), f64::NAN);
    for (k, entry) in stencil.iter().enumerate() {
        let Some((lo, hi, w)) = *entry else { continue };
        let left = values.index_axis(Axis(axis), lo);
        let right = values.index_axis(Axis(axis), hi);
        let mut slot = out.index_axis_mut(Axis(axis), k);
        ndarray::Zip::from(&mut slot)
            .and(&left)
            .and(&right)
            .for_each(|o, &a, &b| {
                *o = if w == 0.0 { a } else { a * (1.0 - w) + b * w };
            });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::deserialize;
    use ndarray::array;

    fn coord(yaml: &str) -> Coord {
        let (schema, _) = deserialize(yaml, "s").unwrap();
        schema.dataset.coords[0].clone()
    }

    #[test]
    fn test_sort_sorted_axis() {
        let c = coord("COORDS:\n  t: ~\n");
        let new = CoordValues::F64(vec![25.0, 35.0, 15.0]);
        let old = CoordValues::F64(vec![0.0, 10.0, 20.0, 30.0]);
        let (perm, split) = sort_by_coord(&new, &old, &c).unwrap();
        assert_eq!(perm, vec![2, 0, 1]);
        // 15 and 25 lie below the old maximum, plus one boundary value.
        assert_eq!(split, 3);
    }

    #[test]
    fn test_sort_sorted_axis_with_boundary_value() {
        let c = coord("COORDS:\n  t: ~\n");
        let new = CoordValues::F64(vec![10.0, 20.0, 30.0]);
        let old = CoordValues::F64(vec![0.0, 10.0, 20.0, 30.0]);
        let (_, split) = sort_by_coord(&new, &old, &c).unwrap();
        assert_eq!(split, 3);
    }

    #[test]
    fn test_unsorted_partial_overlap_is_fatal() {
        let c = coord("COORDS:\n  site:\n    sorted: false\n");
        let new = CoordValues::Str(vec!["b".into(), "d".into()]);
        let old = CoordValues::Str(vec!["a".into(), "b".into(), "c".into()]);
        assert!(sort_by_coord(&new, &old, &c).is_err());
    }

    #[test]
    fn test_unsorted_full_overlap_keeps_existing_order() {
        let c = coord("COORDS:\n  site:\n    sorted: false\n");
        let new = CoordValues::Str(vec!["d".into(), "b".into(), "a".into()]);
        let old = CoordValues::Str(vec!["a".into(), "b".into()]);
        let (perm, split) = sort_by_coord(&new, &old, &c).unwrap();
        assert_eq!(split, 2);
        // a, b in existing order, then d.
        assert_eq!(perm, vec![2, 1, 0]);
    }

    #[test]
    fn test_interpolate_coord_overlap_and_tail() {
        let c = coord("COORDS:\n  t: ~\n");
        let new = CoordValues::F64(vec![15.0, 25.0, 35.0]);
        let old = CoordValues::F64(vec![0.0, 10.0, 20.0, 30.0]);
        let mut warnings = Vec::new();
        let (merged, s) =
            interpolate_coord(&new, &old, 3, &c, &Unit::dimensionless(), &mut warnings).unwrap();
        // Existing sub-range covered by [15, 35] plus the new tail value.
        assert_eq!(merged, CoordValues::F64(vec![20.0, 30.0, 35.0]));
        assert_eq!(s, AxisSplit { front: 0, offset: 2, split: 2 });
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_interpolate_coord_front_insertion() {
        let c = coord("COORDS:\n  t: ~\n");
        let new = CoordValues::F64(vec![-5.0, 15.0]);
        let old = CoordValues::F64(vec![0.0, 10.0, 20.0]);
        let mut warnings = Vec::new();
        let (merged, s) =
            interpolate_coord(&new, &old, 2, &c, &Unit::dimensionless(), &mut warnings).unwrap();
        // -5 sits before the existing range and keeps sorted position.
        assert_eq!(merged, CoordValues::F64(vec![-5.0, 0.0, 10.0]));
        assert_eq!(s, AxisSplit { front: 1, offset: 0, split: 2 });
    }

    #[test]
    fn test_interpolate_coord_forbid_drops_tail() {
        let c = coord("COORDS:\n  t:\n    step_limits: ~\n");
        let new = CoordValues::F64(vec![35.0, 45.0, 55.0]);
        let old = CoordValues::F64(vec![0.0, 10.0, 20.0, 30.0]);
        let mut warnings = Vec::new();
        let (merged, _) =
            interpolate_coord(&new, &old, 1, &c, &Unit::dimensionless(), &mut warnings).unwrap();
        // The whole update lies beyond the stored range: nothing lands,
        // not even the boundary value, and the count says so.
        assert_eq!(merged, CoordValues::F64(vec![]));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("dropping 3 of 3"));
    }

    #[test]
    fn test_interpolate_coord_forbid_keeps_boundary_for_interpolation() {
        let c = coord("COORDS:\n  t:\n    step_limits: ~\n");
        let new = CoordValues::F64(vec![25.0, 35.0, 45.0]);
        let old = CoordValues::F64(vec![0.0, 10.0, 20.0, 30.0]);
        let mut warnings = Vec::new();
        let (merged, _) =
            interpolate_coord(&new, &old, 2, &c, &Unit::dimensionless(), &mut warnings).unwrap();
        // 35 interpolates the overlapped existing point and is then
        // dropped with the rest of the tail.
        assert_eq!(merged, CoordValues::F64(vec![30.0]));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("dropping 1 of 2"));
    }

    #[test]
    fn test_interpolate_coord_range_regularizes_tail() {
        let c = coord("COORDS:\n  t:\n    step_limits: [1, 2, \"min\"]\n");
        let new = CoordValues::F64(vec![0.0, 300.0]);
        let old = CoordValues::F64(vec![0.0]);
        let mut warnings = Vec::new();
        let (merged, s) =
            interpolate_coord(&new, &old, 2, &c, &Unit::parse("s").unwrap(), &mut warnings)
                .unwrap();
        // [1, 2] minutes are [60, 120] seconds on this axis. The seam gap
        // is seeded from the last stored value and subdivided; the seed
        // itself is not re-appended.
        assert_eq!(merged, CoordValues::F64(vec![0.0, 100.0, 200.0, 300.0]));
        assert_eq!(s, AxisSplit { front: 0, offset: 0, split: 1 });
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_adjust_grid() {
        // Oversize gap subdivided, undersize point dropped.
        let out = adjust_grid(&[0.0, 10.0, 10.5, 13.0], 1.0, 4.0);
        assert_eq!(out, vec![0.0, 10.0 / 3.0, 20.0 / 3.0, 10.0, 13.0]);
    }

    #[test]
    fn test_interpolate_ds_neighbors() {
        let schema = deserialize("COORDS:\n  t: ~\nVARS:\n  v:\n    coords: [\"t\"]\n", "s")
            .unwrap()
            .0
            .dataset;
        let mut existing = Dataset::new();
        existing.add_coord("t", CoordValues::F64(vec![1000.0]));
        existing
            .add_var("v", vec!["t".into()], array![280.0].into_dyn())
            .unwrap();
        let mut update = Dataset::new();
        update.add_coord("t", CoordValues::F64(vec![999.0, 1001.0]));
        update
            .add_var("v", vec!["t".into()], array![279.0, 281.0].into_dyn())
            .unwrap();

        let interp = interpolate_ds(&update, &existing, &schema).unwrap();
        assert_eq!(
            interp.dataset.coord("t").unwrap(),
            &CoordValues::F64(vec![999.0, 1000.0, 1001.0])
        );
        let v = &interp.dataset.var("v").unwrap().values;
        // New boundary values verbatim, the existing point interpolated
        // between its neighbors.
        assert!((v[[0]] - 279.0).abs() < 1e-9);
        assert!((v[[1]] - 280.0).abs() < 1e-9);
        assert!((v[[2]] - 281.0).abs() < 1e-9);
        assert_eq!(
            interp.splits["t"],
            AxisSplit { front: 1, offset: 0, split: 1 }
        );
    }

    #[test]
    fn test_interp_axis_out_of_range_is_nan() {
        let values = array![[1.0, 2.0], [3.0, 4.0]].into_dyn();
        let out = interp_axis(&values, 0, &[10.0, 20.0], &[5.0, 10.0, 15.0]);
        assert!(out[[0, 0]].is_nan());
        assert_eq!(out[[1, 0]], 1.0);
        assert_eq!(out[[2, 1]], 3.0);
    }
}
