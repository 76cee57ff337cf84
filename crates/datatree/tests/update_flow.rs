//! End-to-end update flows against an in-process store.

use datatree::{open_store, read_store, remove_store, CoordValues, Frame, Node, Selector};
use storage::{StorageConfig, StoreRegistry};

const TEMPORAL: &str = r#"
ATTRS:
  STORE_URL: "memory:"
COORDS:
  time:
    chunk_size: 16
VARS:
  temperature:
    unit: "degC"
    coords: ["time"]
  time:
    coords: ["time"]
"#;

const WEATHER: &str = r#"
ATTRS:
  STORE_URL: "memory:"
COORDS:
  time:
    chunk_size: 16
  location:
    composed: [lat, lon]
    sorted: false
VARS:
  temperature:
    coords: ["time", "location"]
  time:
    coords: ["time"]
  lat:
    coords: ["location"]
  lon:
    coords: ["location"]
"#;

fn open(yaml: &str, registry: &StoreRegistry) -> Node {
    let (schema, warnings) = datatree::deserialize(yaml, "test").unwrap();
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    open_store(&schema, registry).unwrap()
}

fn rows(pairs: &[(f64, f64)]) -> Frame {
    Frame::new()
        .with_column("time", pairs.iter().map(|&(t, _)| t).collect::<Vec<_>>())
        .unwrap()
        .with_column(
            "temperature",
            pairs.iter().map(|&(_, v)| v).collect::<Vec<_>>(),
        )
        .unwrap()
}

fn temperatures(node: &Node) -> Vec<f64> {
    let ds = node.dataset().unwrap();
    ds.var("temperature").unwrap().values.iter().copied().collect()
}

#[test]
fn test_first_write_populates_empty_node() {
    let registry = StoreRegistry::new();
    let mut node = open(TEMPORAL, &registry);
    assert!(node.is_empty());

    let ds = node.update(&rows(&[(1000.0, 280.0)])).unwrap();
    assert!(!node.is_empty());
    assert_eq!(ds.coord("time").unwrap(), &CoordValues::F64(vec![1000.0]));
    assert_eq!(temperatures(&node), vec![280.0]);
}

#[test]
fn test_merge_keeps_sorted_axis_monotonic() {
    let registry = StoreRegistry::new();
    let mut node = open(TEMPORAL, &registry);

    node.update(&rows(&[(1000.0, 280.0)])).unwrap();
    let ds = node
        .update(&rows(&[(999.0, 279.0), (1001.0, 281.0)]))
        .unwrap();

    assert_eq!(
        ds.coord("time").unwrap(),
        &CoordValues::F64(vec![999.0, 1000.0, 1001.0])
    );
    let t = temperatures(&node);
    assert!((t[0] - 279.0).abs() < 1e-9);
    assert!((t[1] - 280.0).abs() < 1e-9);
    assert!((t[2] - 281.0).abs() < 1e-9);
}

#[test]
fn test_tail_extension_appends() {
    let registry = StoreRegistry::new();
    let mut node = open(TEMPORAL, &registry);

    node.update(&rows(&[(1000.0, 280.0), (1100.0, 281.0)])).unwrap();
    let ds = node.update(&rows(&[(1200.0, 282.0)])).unwrap();

    assert_eq!(
        ds.coord("time").unwrap(),
        &CoordValues::F64(vec![1000.0, 1100.0, 1200.0])
    );
    assert_eq!(temperatures(&node), vec![280.0, 281.0, 282.0]);
}

#[test]
fn test_remerge_same_rows_is_idempotent() {
    let registry = StoreRegistry::new();
    let mut node = open(TEMPORAL, &registry);

    let frame = rows(&[(1000.0, 280.0), (1100.0, 281.0)]);
    let first = node.update(&frame).unwrap();
    let second = node.update(&frame).unwrap();

    assert_eq!(first.coord("time").unwrap(), second.coord("time").unwrap());
    assert_eq!(temperatures(&node), vec![280.0, 281.0]);
}

#[test]
fn test_overlap_region_overwrites_values() {
    let registry = StoreRegistry::new();
    let mut node = open(TEMPORAL, &registry);

    node.update(&rows(&[(1000.0, 280.0), (1100.0, 281.0)])).unwrap();
    node.update(&rows(&[(1000.0, 290.0), (1100.0, 291.0)])).unwrap();
    assert_eq!(temperatures(&node), vec![290.0, 291.0]);
}

#[test]
fn test_composite_axis_update_and_extension() {
    let registry = StoreRegistry::new();
    let mut node = open(WEATHER, &registry);

    let frame = Frame::new()
        .with_column("time", vec![1.0, 1.0, 2.0, 2.0])
        .unwrap()
        .with_column("lat", vec![50.0, 51.0, 50.0, 51.0])
        .unwrap()
        .with_column("lon", vec![14.0, 15.0, 14.0, 15.0])
        .unwrap()
        .with_column("temperature", vec![1.0, 2.0, 3.0, 4.0])
        .unwrap();
    let ds = node.update(&frame).unwrap();
    assert_eq!(ds.coord("location").unwrap().len(), 2);
    assert_eq!(ds.var("temperature").unwrap().values.shape(), &[2, 2]);

    // A later update covering both stored locations at a new time appends
    // one row along the time axis.
    let more = Frame::new()
        .with_column("time", vec![3.0, 3.0])
        .unwrap()
        .with_column("lat", vec![50.0, 51.0])
        .unwrap()
        .with_column("lon", vec![14.0, 15.0])
        .unwrap()
        .with_column("temperature", vec![5.0, 6.0])
        .unwrap();
    let ds = node.update(&more).unwrap();
    assert_eq!(
        ds.coord("time").unwrap(),
        &CoordValues::F64(vec![1.0, 2.0, 3.0])
    );
    assert_eq!(ds.coord("location").unwrap().len(), 2);
    let q = &ds.var("temperature").unwrap().values;
    assert_eq!(q[[2, 0]], 5.0);
    assert_eq!(q[[2, 1]], 6.0);
    // Constituent values persisted over the composite axis.
    let lat = &ds.var("lat").unwrap().values;
    assert_eq!(lat[[0]], 50.0);
    assert_eq!(lat[[1]], 51.0);
}

#[test]
fn test_new_location_extends_composite_axis() {
    let registry = StoreRegistry::new();
    let mut node = open(WEATHER, &registry);

    let frame = Frame::new()
        .with_column("time", vec![1.0])
        .unwrap()
        .with_column("lat", vec![50.0])
        .unwrap()
        .with_column("lon", vec![14.0])
        .unwrap()
        .with_column("temperature", vec![1.0])
        .unwrap();
    node.update(&frame).unwrap();

    let fresh = Frame::new()
        .with_column("time", vec![1.0])
        .unwrap()
        .with_column("lat", vec![60.0])
        .unwrap()
        .with_column("lon", vec![20.0])
        .unwrap()
        .with_column("temperature", vec![9.0])
        .unwrap();
    let ds = node.update(&fresh).unwrap();
    assert_eq!(ds.coord("location").unwrap().len(), 2);
    let q = &ds.var("temperature").unwrap().values;
    assert_eq!(q[[0, 0]], 1.0);
    assert_eq!(q[[0, 1]], 9.0);
}

#[test]
fn test_reopen_preserves_data() {
    let registry = StoreRegistry::new();
    let mut node = open(TEMPORAL, &registry);
    node.update(&rows(&[(1000.0, 280.0)])).unwrap();
    node.close();

    // Same registry hands back the same cached store.
    let reopened = open(TEMPORAL, &registry);
    assert!(!reopened.is_empty());
    assert_eq!(temperatures(&reopened), vec![280.0]);

    // The stored schema alone is enough to rebuild the tree.
    let config = StorageConfig::from_url("memory:");
    let from_store = read_store(&config, &registry).unwrap();
    assert_eq!(temperatures(&from_store), vec![280.0]);
}

#[test]
fn test_structure_mismatch_is_fatal() {
    let registry = StoreRegistry::new();
    let node = open(TEMPORAL, &registry);
    drop(node);

    let changed = TEMPORAL.replace("temperature", "pressure");
    let (schema, _) = datatree::deserialize(&changed, "test").unwrap();
    assert!(open_store(&schema, &registry).is_err());
}

#[test]
fn test_child_nodes_update_independently() {
    let yaml = r#"
ATTRS:
  STORE_URL: "memory:"
COORDS:
  time: ~
VARS:
  temperature:
    coords: ["time"]
  time:
    coords: ["time"]
child_1:
  COORDS:
    time: ~
  VARS:
    temperature:
      coords: ["time"]
    time:
      coords: ["time"]
"#;
    let registry = StoreRegistry::new();
    let (schema, _) = datatree::deserialize(yaml, "test").unwrap();
    let mut root = open_store(&schema, &registry).unwrap();

    root.update(&rows(&[(1000.0, 280.0)])).unwrap();
    root.child_mut("child_1")
        .unwrap()
        .update(&rows(&[(1001.0, 281.0)]))
        .unwrap();

    assert_eq!(temperatures(&root), vec![280.0]);
    assert_eq!(temperatures(root.child("child_1").unwrap()), vec![281.0]);
}

const STEPPED: &str = r#"
ATTRS:
  STORE_URL: "memory:"
COORDS:
  time:
    chunk_size: 16
    step_limits: [50, 100]
VARS:
  temperature:
    unit: "degC"
    coords: ["time"]
  time:
    coords: ["time"]
"#;

#[test]
fn test_step_limited_axis_subdivides_seam_gap() {
    let registry = StoreRegistry::new();
    let mut node = open(STEPPED, &registry);
    node.update(&rows(&[(1000.0, 280.0)])).unwrap();

    let ds = node.update(&rows(&[(1300.0, 282.0)])).unwrap();

    // The 300 gap from the stored tail exceeds the 100 maximum and is
    // subdivided; the generated points carry no data.
    assert_eq!(
        ds.coord("time").unwrap(),
        &CoordValues::F64(vec![1000.0, 1100.0, 1200.0, 1300.0])
    );
    let t = temperatures(&node);
    assert!((t[0] - 280.0).abs() < 1e-9);
    assert!(t[1].is_nan());
    assert!(t[2].is_nan());
    assert!((t[3] - 282.0).abs() < 1e-9);
}

#[test]
fn test_undeclared_child_with_structure_is_adopted() {
    let with_child = r#"
ATTRS:
  STORE_URL: "memory:"
COORDS:
  time: ~
VARS:
  temperature:
    coords: ["time"]
  time:
    coords: ["time"]
child_1:
  COORDS:
    time: ~
  VARS:
    temperature:
      coords: ["time"]
    time:
      coords: ["time"]
"#;
    let without_child = r#"
ATTRS:
  STORE_URL: "memory:"
COORDS:
  time: ~
VARS:
  temperature:
    coords: ["time"]
  time:
    coords: ["time"]
"#;
    let registry = StoreRegistry::new();
    let (schema, _) = datatree::deserialize(with_child, "test").unwrap();
    let mut root = open_store(&schema, &registry).unwrap();
    root.child_mut("child_1")
        .unwrap()
        .update(&rows(&[(1001.0, 281.0)]))
        .unwrap();
    root.close();

    // Reopening without the child keeps the on-disk group in the tree.
    let (schema, _) = datatree::deserialize(without_child, "test").unwrap();
    let root = open_store(&schema, &registry).unwrap();
    let child = root.child("child_1").expect("on-disk child adopted");
    assert_eq!(temperatures(child), vec![281.0]);
}

#[test]
fn test_structureless_on_disk_group_becomes_empty_node() {
    use zarrs_storage::WritableStorageTraits;

    let registry = StoreRegistry::new();
    let mut root = open(TEMPORAL, &registry);
    root.update(&rows(&[(1000.0, 280.0)])).unwrap();
    root.close();

    // A group written by some other tool, carrying no structure attribute.
    let handle = registry.open(&StorageConfig::from_url("memory:")).unwrap();
    handle
        .store
        .set(
            &storage::metadata_key("orphan").unwrap(),
            zarrs_storage::Bytes::from(r#"{"zarr_format": 3, "node_type": "group"}"#),
        )
        .unwrap();

    let root = open(TEMPORAL, &registry);
    let orphan = root.child("orphan").expect("group kept in the tree");
    assert!(orphan.is_empty());
    assert_eq!(temperatures(&root), vec![280.0]);
}

#[test]
fn test_read_df_flattens_with_selector() {
    let registry = StoreRegistry::new();
    let mut node = open(TEMPORAL, &registry);
    node.update(&rows(&[(1000.0, 280.0), (1100.0, 281.0)])).unwrap();

    let frame = node.read_df(&["temperature"], &[]).unwrap();
    assert_eq!(frame.rows(), 2);
    assert_eq!(
        frame.column("time").unwrap().as_f64("time").unwrap(),
        [1000.0, 1100.0]
    );
    assert_eq!(
        frame
            .column("temperature")
            .unwrap()
            .as_f64("temperature")
            .unwrap(),
        [280.0, 281.0]
    );

    let selected = node
        .read_df(
            &["temperature"],
            &[("time".to_string(), Selector::F64(1100.0))],
        )
        .unwrap();
    assert_eq!(selected.rows(), 1);
    assert_eq!(
        selected
            .column("temperature")
            .unwrap()
            .as_f64("temperature")
            .unwrap(),
        [281.0]
    );
}

#[test]
fn test_remove_store_erases_and_evicts() {
    let registry = StoreRegistry::new();
    let mut node = open(TEMPORAL, &registry);
    node.update(&rows(&[(1000.0, 280.0)])).unwrap();
    node.close();

    let (schema, _) = datatree::deserialize(TEMPORAL, "test").unwrap();
    remove_store(&schema, &registry).unwrap();
    assert!(registry.is_empty());

    // A fresh open starts from scratch.
    let node = open(TEMPORAL, &registry);
    assert!(node.is_empty());
}
