//! Storage dtype descriptors and lossy-cast detection.
//!
//! Schema dtype strings map onto the chunked-array data types the engine can
//! store. Conversion into a declared dtype is cast-first: values are cast,
//! then compared element-wise against the originals, and any exact-value
//! change is reported as a [`TrimmedCast`] warning rather than an error.

use std::fmt;

use zarrs::array::{DataType, FillValue};

/// Total order of dtype categories, narrower first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Bool,
    Int,
    Float,
    Str,
}

/// A declared storage dtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DType {
    Bool,
    /// Signed integer of the given bit width (8, 16, 32 or 64).
    Int(u8),
    /// IEEE float of the given bit width (32 or 64).
    Float(u8),
    /// Fixed maximum length string of `n` characters.
    Str(u32),
}

pub const DEFAULT_STR_LEN: u32 = 8;

impl DType {
    /// Parse a schema dtype spelling. Returns the dtype and an optional
    /// warning message (bare `str` falls back to the default length).
    pub fn parse(spec: &str) -> Result<(DType, Option<String>), String> {
        let s = spec.trim();
        let parsed = match s {
            "bool" => DType::Bool,
            "int8" => DType::Int(8),
            "int16" => DType::Int(16),
            "int32" => DType::Int(32),
            "int" | "int64" => DType::Int(64),
            "float32" => DType::Float(32),
            "float" | "float64" => DType::Float(64),
            "str" => {
                return Ok((
                    DType::Str(DEFAULT_STR_LEN),
                    Some(format!(
                        "dtype 'str' without a length, using str[{DEFAULT_STR_LEN}]"
                    )),
                ))
            }
            other => {
                if let Some(inner) = other.strip_prefix("str[").and_then(|r| r.strip_suffix(']')) {
                    let n: u32 = inner
                        .trim()
                        .parse()
                        .map_err(|_| format!("bad string length in dtype '{spec}'"))?;
                    if n == 0 {
                        return Err(format!("zero-length string dtype '{spec}'"));
                    }
                    return Ok((DType::Str(n), None));
                }
                return Err(format!("unknown dtype '{spec}'"));
            }
        };
        Ok((parsed, None))
    }

    /// Canonical spelling, used for serialization.
    pub fn spec(&self) -> String {
        match self {
            DType::Bool => "bool".to_string(),
            DType::Int(64) => "int64".to_string(),
            DType::Int(w) => format!("int{w}"),
            DType::Float(64) => "float64".to_string(),
            DType::Float(w) => format!("float{w}"),
            DType::Str(n) => format!("str[{n}]"),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            DType::Bool => Category::Bool,
            DType::Int(_) => Category::Int,
            DType::Float(_) => Category::Float,
            DType::Str(_) => Category::Str,
        }
    }

    /// Bit width within the category.
    pub fn width(&self) -> u32 {
        match self {
            DType::Bool => 1,
            DType::Int(w) | DType::Float(w) => u32::from(*w),
            DType::Str(n) => *n,
        }
    }

    /// Whether every value of `self` is exactly representable in `other`.
    /// Category order first, width within a category.
    pub fn fits_in(&self, other: &DType) -> bool {
        match self.category().cmp(&other.category()) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => self.width() <= other.width(),
        }
    }

    /// The chunked-array data type backing this dtype.
    pub fn data_type(&self) -> DataType {
        match self {
            DType::Bool => DataType::Bool,
            DType::Int(8) => DataType::Int8,
            DType::Int(16) => DataType::Int16,
            DType::Int(32) => DataType::Int32,
            DType::Int(_) => DataType::Int64,
            DType::Float(32) => DataType::Float32,
            DType::Float(_) => DataType::Float64,
            DType::Str(_) => DataType::String,
        }
    }

    /// Fill value doubling as the missing-data sentinel of this dtype.
    pub fn fill_value(&self) -> FillValue {
        match self {
            DType::Bool => FillValue::from(false),
            DType::Int(8) => FillValue::from(i8::MIN),
            DType::Int(16) => FillValue::from(i16::MIN),
            DType::Int(32) => FillValue::from(i32::MIN),
            DType::Int(_) => FillValue::from(i64::MIN),
            DType::Float(32) => FillValue::from(f32::NAN),
            DType::Float(_) => FillValue::from(f64::NAN),
            DType::Str(_) => FillValue::from(""),
        }
    }

    /// Missing-data sentinel in the `f64` working representation, or `None`
    /// where the dtype has no representable sentinel.
    pub fn na_value(&self) -> Option<f64> {
        match self {
            DType::Bool | DType::Str(_) => None,
            DType::Int(8) => Some(f64::from(i8::MIN)),
            DType::Int(16) => Some(f64::from(i16::MIN)),
            DType::Int(32) => Some(f64::from(i32::MIN)),
            DType::Int(_) => Some(i64::MIN as f64),
            DType::Float(_) => Some(f64::NAN),
        }
    }

    /// Integer value range, for categories that have one.
    fn int_range(&self) -> Option<(f64, f64)> {
        match self {
            DType::Int(8) => Some((f64::from(i8::MIN), f64::from(i8::MAX))),
            DType::Int(16) => Some((f64::from(i16::MIN), f64::from(i16::MAX))),
            DType::Int(32) => Some((f64::from(i32::MIN), f64::from(i32::MAX))),
            DType::Int(_) => Some((i64::MIN as f64, i64::MAX as f64)),
            _ => None,
        }
    }

    /// Cast one working value into this dtype, returning the value as it
    /// will read back. NaN casts to the dtype's sentinel where one exists.
    pub fn cast(&self, value: f64) -> Result<f64, String> {
        if value.is_nan() {
            return self.na_value().ok_or_else(|| {
                format!("missing value not representable in dtype '{}'", self.spec())
            });
        }
        match self {
            DType::Bool => Ok(if value != 0.0 { 1.0 } else { 0.0 }),
            DType::Int(_) => {
                let (lo, hi) = self.int_range().expect("int dtype has a range");
                Ok(value.trunc().clamp(lo, hi))
            }
            DType::Float(32) => Ok(f64::from(value as f32)),
            DType::Float(_) => Ok(value),
            DType::Str(_) => Err("numeric value cast to string dtype".to_string()),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec())
    }
}

/// How many changed originals a [`TrimmedCast`] lists verbatim.
const TRIM_SAMPLE: usize = 10;

/// Report of values changed by a cast into a declared dtype.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedCast {
    /// Column or coordinate that was cast.
    pub name: String,
    /// Target dtype spelling.
    pub dtype: String,
    /// First few original values that changed.
    pub samples: Vec<f64>,
    /// Changed values beyond the listed samples.
    pub remaining: usize,
}

impl fmt::Display for TrimmedCast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lossy cast of '{}' to {}: changed values {:?}",
            self.name, self.dtype, self.samples
        )?;
        if self.remaining > 0 {
            write!(f, " and {} more", self.remaining)?;
        }
        Ok(())
    }
}

/// Cast a working buffer into `dtype` in place. Returns a [`TrimmedCast`]
/// when any element's exact value changed.
pub fn cast_values(
    name: &str,
    dtype: &DType,
    values: &mut [f64],
) -> Result<Option<TrimmedCast>, String> {
    let mut samples = Vec::new();
    let mut remaining = 0usize;
    for v in values.iter_mut() {
        let original = *v;
        let cast = dtype.cast(original)?;
        // NaN maps to the NA sentinel; that is representation, not loss.
        let changed = !original.is_nan() && cast != original;
        if changed {
            if samples.len() < TRIM_SAMPLE {
                samples.push(original);
            } else {
                remaining += 1;
            }
        }
        *v = cast;
    }
    if samples.is_empty() {
        Ok(None)
    } else {
        Ok(Some(TrimmedCast {
            name: name.to_string(),
            dtype: dtype.spec(),
            samples,
            remaining,
        }))
    }
}

/// Truncate strings to the declared maximum length, reporting truncations.
pub fn cast_strings(name: &str, max_len: u32, values: &mut [String]) -> Option<TrimmedCast> {
    let mut samples = Vec::new();
    let mut remaining = 0usize;
    for (i, v) in values.iter_mut().enumerate() {
        if v.chars().count() > max_len as usize {
            *v = v.chars().take(max_len as usize).collect();
            if samples.len() < TRIM_SAMPLE {
                samples.push(i as f64);
            } else {
                remaining += 1;
            }
        }
    }
    if samples.is_empty() {
        None
    } else {
        Some(TrimmedCast {
            name: name.to_string(),
            dtype: format!("str[{max_len}]"),
            samples,
            remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spellings() {
        assert_eq!(DType::parse("int").unwrap().0, DType::Int(64));
        assert_eq!(DType::parse("float32").unwrap().0, DType::Float(32));
        assert_eq!(DType::parse("str[12]").unwrap().0, DType::Str(12));
        assert!(DType::parse("complex128").is_err());
        assert!(DType::parse("str[0]").is_err());
    }

    #[test]
    fn test_bare_str_warns() {
        let (dtype, warning) = DType::parse("str").unwrap();
        assert_eq!(dtype, DType::Str(DEFAULT_STR_LEN));
        assert!(warning.is_some());
    }

    #[test]
    fn test_category_order() {
        assert!(DType::Bool.fits_in(&DType::Int(8)));
        assert!(DType::Int(16).fits_in(&DType::Int(32)));
        assert!(!DType::Int(32).fits_in(&DType::Int(16)));
        assert!(DType::Int(64).fits_in(&DType::Float(64)));
        assert!(!DType::Float(32).fits_in(&DType::Int(64)));
    }

    #[test]
    fn test_cast_float_to_int_trims() {
        let mut values = vec![1.0, 1.2, -3.7, 4.0];
        let warning = cast_values("q", &DType::Int(32), &mut values)
            .unwrap()
            .expect("lossy cast detected");
        assert_eq!(warning.samples, vec![1.2, -3.7]);
        assert_eq!(warning.remaining, 0);
        assert_eq!(values, vec![1.0, 1.0, -3.0, 4.0]);
    }

    #[test]
    fn test_cast_exact_is_silent() {
        let mut values = vec![1.0, 2.0, f64::NAN];
        let warning = cast_values("q", &DType::Float(64), &mut values).unwrap();
        assert!(warning.is_none());
    }

    #[test]
    fn test_cast_nan_to_int_sentinel() {
        let mut values = vec![f64::NAN];
        cast_values("q", &DType::Int(32), &mut values).unwrap();
        assert_eq!(values[0], f64::from(i32::MIN));
    }

    #[test]
    fn test_trim_sample_cap() {
        let mut values: Vec<f64> = (0..15).map(|i| i as f64 + 0.5).collect();
        let warning = cast_values("q", &DType::Int(64), &mut values)
            .unwrap()
            .expect("lossy cast detected");
        assert_eq!(warning.samples.len(), 10);
        assert_eq!(warning.remaining, 5);
    }

    #[test]
    fn test_string_truncation() {
        let mut values = vec!["short".to_string(), "way too long".to_string()];
        let warning = cast_strings("site", 6, &mut values).expect("truncation detected");
        assert_eq!(values[1], "way to");
        assert_eq!(warning.remaining, 0);
    }
}
