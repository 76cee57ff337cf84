//! Schema model: a YAML tree of node definitions.
//!
//! A schema file is a mapping per node with three reserved keys, `ATTRS`
//! (free-form metadata), `COORDS` (name to coordinate definition) and `VARS`
//! (name to variable definition); every other key names a child node whose
//! value is a nested node mapping. Parsing is a pure pass producing a fresh
//! tree plus non-fatal warnings; fatal problems carry the tree address of
//! the offending entry.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::dtype::DType;
use crate::error::{Result, SchemaError, SchemaWarning, TreeError};
use crate::units::{DateTimeUnit, Tick, Unit, UnitSpec};

pub const KEY_ATTRS: &str = "ATTRS";
pub const KEY_COORDS: &str = "COORDS";
pub const KEY_VARS: &str = "VARS";

const DEFAULT_CHUNK_SIZE: u64 = 1024;

/// Position of a schema entry, for diagnostics: source name plus node path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaAddress {
    source: String,
    path: Vec<String>,
}

impl SchemaAddress {
    pub fn root(source: &str) -> SchemaAddress {
        SchemaAddress {
            source: source.to_string(),
            path: Vec::new(),
        }
    }

    /// Address of a child entry.
    pub fn dive(&self, key: &str) -> SchemaAddress {
        let mut path = self.path.clone();
        path.push(key.to_string());
        SchemaAddress {
            source: self.source.clone(),
            path,
        }
    }

    fn error(&self, message: impl Into<String>) -> SchemaError {
        SchemaError::new(message, &self.to_string())
    }

    fn warning(&self, message: impl Into<String>) -> SchemaWarning {
        SchemaWarning::new(message, &self.to_string())
    }
}

impl std::fmt::Display for SchemaAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:/{}", self.source, self.path.join("/"))
    }
}

/// Tail spacing policy of a sorted axis.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StepLimits {
    /// Extension forbidden; at most one boundary value is kept for
    /// interpolation, further values are dropped with a warning.
    Forbid,
    /// Unrestricted append.
    #[default]
    Unlimited,
    /// Generated extension points keep gaps within `[min, max]`, given in
    /// `unit` (the axis step unit when absent).
    Range {
        min: f64,
        max: f64,
        unit: Option<Unit>,
    },
}

/// One coordinate axis definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Coord {
    pub name: String,
    pub description: String,
    /// Underlying scalar fields; more than one means a hashed composite.
    pub composed: Vec<String>,
    /// Ascending order with range interpolation, vs. positional merge.
    pub sorted: bool,
    pub chunk_size: u64,
    pub step_limits: StepLimits,
}

impl Coord {
    fn with_defaults(name: &str) -> Coord {
        Coord {
            name: name.to_string(),
            description: String::new(),
            composed: vec![name.to_string()],
            sorted: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            step_limits: StepLimits::default(),
        }
    }

    /// Whether this axis hashes a tuple of fields into one index.
    pub fn is_composite(&self) -> bool {
        self.composed.len() > 1
    }
}

/// One variable definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub description: String,
    /// Storage unit; source values are converted into it on ingestion.
    pub unit: UnitSpec,
    /// Unit of the source column, when it differs from `unit`.
    pub source_unit: Option<Unit>,
    /// Axis names, outermost first.
    pub coords: Vec<String>,
    /// Source column name; defaults to the variable name.
    pub df_col: Option<String>,
    pub dtype: DType,
}

impl Variable {
    fn with_defaults(name: &str, coords: Vec<String>) -> Variable {
        Variable {
            name: name.to_string(),
            description: String::new(),
            unit: UnitSpec::None,
            source_unit: None,
            coords,
            df_col: None,
            dtype: DType::Float(64),
        }
    }

    /// The source column this variable reads from.
    pub fn source_column(&self) -> &str {
        self.df_col.as_deref().unwrap_or(&self.name)
    }
}

/// Dataset definition of one node: attrs, ordered coords and variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSchema {
    pub attrs: BTreeMap<String, serde_json::Value>,
    pub coords: Vec<Coord>,
    pub vars: Vec<Variable>,
}

impl DatasetSchema {
    pub fn coord(&self, name: &str) -> Option<&Coord> {
        self.coords.iter().find(|c| c.name == name)
    }

    pub fn var(&self, name: &str) -> Option<&Variable> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty() && self.vars.is_empty()
    }

    /// Structural equality: coordinates and variables must match in order,
    /// kinds and units; descriptions and attrs are not structural.
    pub fn structure_eq(&self, other: &DatasetSchema) -> bool {
        if self.coords.len() != other.coords.len() || self.vars.len() != other.vars.len() {
            return false;
        }
        let coord_eq = self.coords.iter().zip(&other.coords).all(|(a, b)| {
            a.name == b.name
                && a.composed == b.composed
                && a.sorted == b.sorted
                && a.chunk_size == b.chunk_size
        });
        let var_eq = self.vars.iter().zip(&other.vars).all(|(a, b)| {
            a.name == b.name && a.unit == b.unit && a.coords == b.coords && a.dtype == b.dtype
        });
        coord_eq && var_eq
    }
}

/// A node of the schema tree.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSchema {
    pub address: String,
    pub dataset: DatasetSchema,
    /// Children in declaration order.
    pub children: Vec<(String, NodeSchema)>,
}

impl NodeSchema {
    pub fn child(&self, name: &str) -> Option<&NodeSchema> {
        self.children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|(n, _)| n.as_str()).collect()
    }
}

/// Parse a schema document. Returns the tree and accumulated warnings.
pub fn deserialize(text: &str, source: &str) -> Result<(NodeSchema, Vec<SchemaWarning>)> {
    let value: Value = serde_yaml::from_str(text)
        .map_err(|e| SchemaError::new(format!("invalid YAML: {e}"), source))?;
    let mut warnings = Vec::new();
    let root = parse_node(&value, &SchemaAddress::root(source), &mut warnings)?;
    Ok((root, warnings))
}

/// Serialize a schema tree back to YAML. Idempotent with [`deserialize`].
pub fn serialize(schema: &NodeSchema) -> Result<String> {
    let value = node_to_yaml(schema);
    serde_yaml::to_string(&value)
        .map_err(|e| TreeError::Schema(SchemaError::new(format!("serialization failed: {e}"), &schema.address)))
}

fn parse_node(
    value: &Value,
    addr: &SchemaAddress,
    warnings: &mut Vec<SchemaWarning>,
) -> Result<NodeSchema> {
    let mapping = value
        .as_mapping()
        .ok_or_else(|| addr.error("node value must be a mapping"))?;

    let mut dataset = DatasetSchema::default();
    let mut children = Vec::new();

    for (key, entry) in mapping {
        let key = key
            .as_str()
            .ok_or_else(|| addr.error("node keys must be strings"))?;
        match key {
            KEY_ATTRS => dataset.attrs = parse_attrs(entry, &addr.dive(KEY_ATTRS))?,
            KEY_COORDS => dataset.coords = parse_coords(entry, &addr.dive(KEY_COORDS), warnings)?,
            KEY_VARS => dataset.vars = parse_vars(entry, &addr.dive(KEY_VARS), warnings)?,
            child => {
                let child_addr = addr.dive(child);
                if !entry.is_mapping() {
                    return Err(child_addr
                        .error("child node value must be a mapping")
                        .into());
                }
                children.push((child.to_string(), parse_node(entry, &child_addr, warnings)?));
            }
        }
    }

    supplement_implicit(&mut dataset, addr, warnings);
    Ok(NodeSchema {
        address: addr.to_string(),
        dataset,
        children,
    })
}

/// Create the members the tree implies: a coordinate for every axis a
/// variable references, and a backing variable for every non-composite
/// coordinate field without one.
fn supplement_implicit(
    dataset: &mut DatasetSchema,
    addr: &SchemaAddress,
    warnings: &mut Vec<SchemaWarning>,
) {
    let referenced: Vec<String> = dataset
        .vars
        .iter()
        .flat_map(|v| v.coords.iter().cloned())
        .collect();
    for name in referenced {
        if dataset.coord(&name).is_none() {
            warnings.push(addr.warning(format!(
                "coordinate '{name}' referenced by a variable but not declared, using defaults"
            )));
            dataset.coords.push(Coord::with_defaults(&name));
        }
    }
    let missing: Vec<(String, String)> = dataset
        .coords
        .iter()
        .flat_map(|c| {
            c.composed
                .iter()
                .filter(|f| dataset.var(f).is_none())
                .map(|f| (f.clone(), c.name.clone()))
                .collect::<Vec<_>>()
        })
        .collect();
    for (field, coord) in missing {
        dataset
            .vars
            .push(Variable::with_defaults(&field, vec![coord]));
    }
}

fn parse_attrs(value: &Value, addr: &SchemaAddress) -> Result<BTreeMap<String, serde_json::Value>> {
    let mapping = value
        .as_mapping()
        .ok_or_else(|| addr.error("ATTRS must be a mapping"))?;
    let mut attrs = BTreeMap::new();
    for (key, entry) in mapping {
        let key = key
            .as_str()
            .ok_or_else(|| addr.error("ATTRS keys must be strings"))?;
        attrs.insert(key.to_string(), yaml_to_json(entry, &addr.dive(key))?);
    }
    Ok(attrs)
}

fn parse_coords(
    value: &Value,
    addr: &SchemaAddress,
    warnings: &mut Vec<SchemaWarning>,
) -> Result<Vec<Coord>> {
    let mapping = value
        .as_mapping()
        .ok_or_else(|| addr.error("COORDS must be a mapping"))?;
    let mut coords = Vec::new();
    for (key, entry) in mapping {
        let name = key
            .as_str()
            .ok_or_else(|| addr.error("coordinate names must be strings"))?;
        coords.push(parse_coord(name, entry, &addr.dive(name), warnings)?);
    }
    Ok(coords)
}

fn parse_coord(
    name: &str,
    value: &Value,
    addr: &SchemaAddress,
    warnings: &mut Vec<SchemaWarning>,
) -> Result<Coord> {
    let mut coord = Coord::with_defaults(name);
    if value.is_null() {
        return Ok(coord);
    }
    let mapping = value
        .as_mapping()
        .ok_or_else(|| addr.error("coordinate definition must be a mapping or null"))?;
    for (key, entry) in mapping {
        let key = key
            .as_str()
            .ok_or_else(|| addr.error("coordinate fields must have string keys"))?;
        let field_addr = addr.dive(key);
        match key {
            "description" => coord.description = string_field(entry, &field_addr)?,
            "composed" => {
                coord.composed = string_list(entry, &field_addr)?;
                if coord.composed.is_empty() {
                    return Err(field_addr.error("'composed' must list at least one field").into());
                }
            }
            "sorted" => {
                coord.sorted = entry
                    .as_bool()
                    .ok_or_else(|| field_addr.error("'sorted' must be a boolean"))?
            }
            "chunk_size" => {
                coord.chunk_size = entry
                    .as_u64()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| field_addr.error("'chunk_size' must be a positive integer"))?
            }
            "step_limits" => coord.step_limits = parse_step_limits(entry, &field_addr)?,
            other => warnings.push(field_addr.warning(format!("unknown coordinate field '{other}'"))),
        }
    }
    // Hashed composite indices carry no meaningful order.
    if coord.is_composite() && coord.sorted {
        if mapping.contains_key(&Value::String("sorted".into())) {
            warnings.push(addr.warning("a composite axis cannot be sorted, treating as unsorted"));
        }
        coord.sorted = false;
    }
    Ok(coord)
}

fn parse_step_limits(value: &Value, addr: &SchemaAddress) -> Result<StepLimits> {
    if value.is_null() {
        return Ok(StepLimits::Forbid);
    }
    let seq = value
        .as_sequence()
        .ok_or_else(|| addr.error("'step_limits' must be null or a list"))?;
    match seq.len() {
        0 => Ok(StepLimits::Unlimited),
        2 | 3 => {
            let min = seq[0]
                .as_f64()
                .ok_or_else(|| addr.error("'step_limits' min must be a number"))?;
            let max = seq[1]
                .as_f64()
                .ok_or_else(|| addr.error("'step_limits' max must be a number"))?;
            if !(min > 0.0 && max >= min) {
                return Err(addr
                    .error(format!("'step_limits' range [{min}, {max}] is not 0 < min <= max"))
                    .into());
            }
            let unit = match seq.get(2) {
                None => None,
                Some(u) => {
                    let spec = u
                        .as_str()
                        .ok_or_else(|| addr.error("'step_limits' unit must be a string"))?;
                    Some(Unit::parse(spec).map_err(|e| addr.error(e))?)
                }
            };
            Ok(StepLimits::Range { min, max, unit })
        }
        n => Err(addr
            .error(format!("'step_limits' must have 0, 2 or 3 entries, found {n}"))
            .into()),
    }
}

fn parse_vars(
    value: &Value,
    addr: &SchemaAddress,
    warnings: &mut Vec<SchemaWarning>,
) -> Result<Vec<Variable>> {
    let mapping = value
        .as_mapping()
        .ok_or_else(|| addr.error("VARS must be a mapping"))?;
    let mut vars = Vec::new();
    for (key, entry) in mapping {
        let name = key
            .as_str()
            .ok_or_else(|| addr.error("variable names must be strings"))?;
        vars.push(parse_var(name, entry, &addr.dive(name), warnings)?);
    }
    Ok(vars)
}

fn parse_var(
    name: &str,
    value: &Value,
    addr: &SchemaAddress,
    warnings: &mut Vec<SchemaWarning>,
) -> Result<Variable> {
    let mut var = Variable::with_defaults(name, Vec::new());
    if value.is_null() {
        return Ok(var);
    }
    let mapping = value
        .as_mapping()
        .ok_or_else(|| addr.error("variable definition must be a mapping or null"))?;
    for (key, entry) in mapping {
        let key = key
            .as_str()
            .ok_or_else(|| addr.error("variable fields must have string keys"))?;
        let field_addr = addr.dive(key);
        match key {
            "description" => var.description = string_field(entry, &field_addr)?,
            "unit" => {
                let spec = string_field(entry, &field_addr)?;
                var.unit = parse_unit_spec(&spec, &field_addr)?;
            }
            "source_unit" => {
                let spec = string_field(entry, &field_addr)?;
                var.source_unit = Some(Unit::parse(&spec).map_err(|e| field_addr.error(e))?);
            }
            "coords" => var.coords = string_list(entry, &field_addr)?,
            "df_col" => var.df_col = Some(string_field(entry, &field_addr)?),
            "dtype" => {
                let spec = string_field(entry, &field_addr)?;
                let (dtype, warning) = DType::parse(&spec).map_err(|e| field_addr.error(e))?;
                var.dtype = dtype;
                if let Some(message) = warning {
                    warnings.push(field_addr.warning(message));
                }
            }
            other => warnings.push(field_addr.warning(format!("unknown variable field '{other}'"))),
        }
    }
    Ok(var)
}

/// A unit string is either a datetime spec, `datetime[tick]` or
/// `datetime[tick, tz]`, or a physical unit spelling.
fn parse_unit_spec(spec: &str, addr: &SchemaAddress) -> Result<UnitSpec> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Ok(UnitSpec::None);
    }
    if trimmed == "datetime" {
        return Ok(UnitSpec::DateTime(DateTimeUnit::default()));
    }
    if let Some(inner) = trimmed
        .strip_prefix("datetime[")
        .and_then(|r| r.strip_suffix(']'))
    {
        let mut parts = inner.splitn(2, ',');
        let tick = Tick::parse(parts.next().unwrap_or("").trim()).map_err(|e| addr.error(e))?;
        let tz = parts.next().map(|s| s.trim().to_string());
        return Ok(UnitSpec::DateTime(DateTimeUnit { tick, tz }));
    }
    Ok(UnitSpec::Physical(
        Unit::parse(trimmed).map_err(|e| addr.error(e))?,
    ))
}

fn string_field(value: &Value, addr: &SchemaAddress) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| addr.error("expected a string").into())
}

/// A list of strings, or a bare string treated as a one-element list.
fn string_list(value: &Value, addr: &SchemaAddress) -> Result<Vec<String>> {
    if let Some(s) = value.as_str() {
        return Ok(vec![s.to_string()]);
    }
    let seq = value
        .as_sequence()
        .ok_or_else(|| addr.error("expected a string or a list of strings"))?;
    seq.iter()
        .map(|v| string_field(v, addr))
        .collect()
}

fn yaml_to_json(value: &Value, addr: &SchemaAddress) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| addr.error(format!("unrepresentable attribute value: {e}")).into())
}

fn json_to_yaml(value: &serde_json::Value) -> Value {
    serde_yaml::to_value(value).unwrap_or(Value::Null)
}

fn node_to_yaml(schema: &NodeSchema) -> Value {
    let mut mapping = serde_yaml::Mapping::new();
    if !schema.dataset.attrs.is_empty() {
        let mut attrs = serde_yaml::Mapping::new();
        for (key, value) in &schema.dataset.attrs {
            attrs.insert(Value::String(key.clone()), json_to_yaml(value));
        }
        mapping.insert(Value::String(KEY_ATTRS.into()), Value::Mapping(attrs));
    }
    if !schema.dataset.coords.is_empty() {
        let mut coords = serde_yaml::Mapping::new();
        for coord in &schema.dataset.coords {
            coords.insert(Value::String(coord.name.clone()), coord_to_yaml(coord));
        }
        mapping.insert(Value::String(KEY_COORDS.into()), Value::Mapping(coords));
    }
    if !schema.dataset.vars.is_empty() {
        let mut vars = serde_yaml::Mapping::new();
        for var in &schema.dataset.vars {
            vars.insert(Value::String(var.name.clone()), var_to_yaml(var));
        }
        mapping.insert(Value::String(KEY_VARS.into()), Value::Mapping(vars));
    }
    for (name, child) in &schema.children {
        mapping.insert(Value::String(name.clone()), node_to_yaml(child));
    }
    Value::Mapping(mapping)
}

fn coord_to_yaml(coord: &Coord) -> Value {
    let mut m = serde_yaml::Mapping::new();
    if !coord.description.is_empty() {
        m.insert("description".into(), coord.description.clone().into());
    }
    if coord.composed != [coord.name.clone()] {
        m.insert(
            "composed".into(),
            Value::Sequence(coord.composed.iter().map(|s| s.clone().into()).collect()),
        );
    }
    if !coord.sorted {
        m.insert("sorted".into(), false.into());
    }
    if coord.chunk_size != DEFAULT_CHUNK_SIZE {
        m.insert("chunk_size".into(), coord.chunk_size.into());
    }
    match &coord.step_limits {
        StepLimits::Unlimited => {}
        StepLimits::Forbid => {
            m.insert("step_limits".into(), Value::Null);
        }
        StepLimits::Range { min, max, unit } => {
            let mut seq = vec![Value::from(*min), Value::from(*max)];
            if let Some(unit) = unit {
                seq.push(unit.spec().into());
            }
            m.insert("step_limits".into(), Value::Sequence(seq));
        }
    }
    if m.is_empty() {
        Value::Null
    } else {
        Value::Mapping(m)
    }
}

fn var_to_yaml(var: &Variable) -> Value {
    let mut m = serde_yaml::Mapping::new();
    if !var.description.is_empty() {
        m.insert("description".into(), var.description.clone().into());
    }
    match &var.unit {
        UnitSpec::None => {}
        UnitSpec::Physical(unit) => {
            m.insert("unit".into(), unit.spec().into());
        }
        UnitSpec::DateTime(dt) => {
            let spec = match &dt.tz {
                Some(tz) => format!("datetime[{}, {tz}]", dt.tick.spec()),
                None => format!("datetime[{}]", dt.tick.spec()),
            };
            m.insert("unit".into(), spec.into());
        }
    }
    if let Some(source_unit) = &var.source_unit {
        m.insert("source_unit".into(), source_unit.spec().into());
    }
    if !var.coords.is_empty() {
        m.insert(
            "coords".into(),
            Value::Sequence(var.coords.iter().map(|s| s.clone().into()).collect()),
        );
    }
    if let Some(df_col) = &var.df_col {
        m.insert("df_col".into(), df_col.clone().into());
    }
    if var.dtype != DType::Float(64) {
        m.insert("dtype".into(), var.dtype.spec().into());
    }
    if m.is_empty() {
        Value::Null
    } else {
        Value::Mapping(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEATHER: &str = r#"
ATTRS:
  store_url: "memory://stations"
COORDS:
  time:
    chunk_size: 365
  location:
    composed: [lat, lon]
    sorted: false
VARS:
  temperature:
    unit: "degC"
    source_unit: "K"
    coords: ["time", "location"]
    df_col: "temp"
  time:
    unit: "datetime[s]"
    coords: ["time"]
  lat:
    coords: ["location"]
  lon:
    coords: ["location"]
inner:
  COORDS:
    depth: ~
  VARS:
    density:
      coords: ["depth"]
"#;

    #[test]
    fn test_parse_weather() {
        let (schema, warnings) = deserialize(WEATHER, "weather.yaml").unwrap();
        assert!(warnings.is_empty());
        let time = schema.dataset.coord("time").unwrap();
        assert_eq!(time.chunk_size, 365);
        assert!(time.sorted);
        let location = schema.dataset.coord("location").unwrap();
        assert!(location.is_composite());
        assert!(!location.sorted);
        let temperature = schema.dataset.var("temperature").unwrap();
        assert_eq!(temperature.source_column(), "temp");
        assert_eq!(temperature.coords, ["time", "location"]);
        assert_eq!(schema.child_names(), ["inner"]);
    }

    #[test]
    fn test_round_trip() {
        let (schema, _) = deserialize(WEATHER, "weather.yaml").unwrap();
        let text = serialize(&schema).unwrap();
        let (again, _) = deserialize(&text, "weather.yaml").unwrap();
        assert_eq!(schema.dataset, again.dataset);
        assert_eq!(schema.children, again.children);
        // Serialization is idempotent.
        assert_eq!(text, serialize(&again).unwrap());
    }

    #[test]
    fn test_implicit_members() {
        let text = "VARS:\n  q:\n    coords: [\"t\"]\n";
        let (schema, warnings) = deserialize(text, "s").unwrap();
        // The referenced axis exists as a coordinate with a backing variable.
        assert!(schema.dataset.coord("t").is_some());
        assert!(schema.dataset.var("t").is_some());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_step_limits_forms() {
        let text = "COORDS:\n  a:\n    step_limits: ~\n  b:\n    step_limits: []\n  c:\n    step_limits: [1, 5, \"h\"]\n";
        let (schema, _) = deserialize(text, "s").unwrap();
        assert_eq!(schema.dataset.coord("a").unwrap().step_limits, StepLimits::Forbid);
        assert_eq!(
            schema.dataset.coord("b").unwrap().step_limits,
            StepLimits::Unlimited
        );
        match &schema.dataset.coord("c").unwrap().step_limits {
            StepLimits::Range { min, max, unit } => {
                assert_eq!((*min, *max), (1.0, 5.0));
                assert_eq!(unit.as_ref().unwrap().spec(), "h");
            }
            other => panic!("unexpected step_limits: {other:?}"),
        }
    }

    #[test]
    fn test_errors_carry_address() {
        let text = "child:\n  COORDS:\n    t:\n      step_limits: [3]\n";
        let err = deserialize(text, "s").unwrap_err();
        assert!(err.to_string().contains("s:/child/COORDS/t/step_limits"));
    }

    #[test]
    fn test_non_mapping_child_is_fatal() {
        let err = deserialize("child: 42\n", "s").unwrap_err();
        assert!(err.to_string().contains("must be a mapping"));
    }

    #[test]
    fn test_bare_str_dtype_warns() {
        let text = "VARS:\n  site:\n    dtype: \"str\"\n    coords: [\"site\"]\n";
        let (schema, warnings) = deserialize(text, "s").unwrap();
        assert_eq!(schema.dataset.var("site").unwrap().dtype, DType::Str(8));
        assert!(warnings.iter().any(|w| w.to_string().contains("str[8]")));
    }
}
