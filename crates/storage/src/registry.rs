//! Process-wide cache of open store handles.
//!
//! Handles are cached by their full connection parameters and live for the
//! registry's lifetime. The registry is an explicit value, not a global:
//! services share one instance, tests create their own.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::backend::{self, StoreHandle};
use crate::config::StorageConfig;
use crate::error::Result;

/// Cache of open store handles keyed by connection parameters.
#[derive(Default)]
pub struct StoreRegistry {
    handles: Mutex<HashMap<StorageConfig, StoreHandle>>,
}

impl StoreRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached handle for `config`, opening the store on first use.
    pub fn open(&self, config: &StorageConfig) -> Result<StoreHandle> {
        let mut handles = self.handles.lock().expect("store registry poisoned");
        if let Some(handle) = handles.get(config) {
            return Ok(handle.clone());
        }
        let handle = backend::open(config)?;
        handles.insert(config.clone(), handle.clone());
        Ok(handle)
    }

    /// Drop the cached handle for `config`, if any.
    ///
    /// Used after [`backend::erase_tree`] removed the store's content; a
    /// later [`StoreRegistry::open`] reopens from scratch.
    pub fn evict(&self, config: &StorageConfig) {
        self.handles
            .lock()
            .expect("store registry poisoned")
            .remove(config);
    }

    /// Number of cached handles.
    pub fn len(&self) -> usize {
        self.handles.lock().expect("store registry poisoned").len()
    }

    /// Whether the registry holds no handles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_handles_are_cached() {
        let registry = StoreRegistry::new();
        let config = StorageConfig::from_url("memory:");

        let a = registry.open(&config).unwrap();
        let b = registry.open(&config).unwrap();
        assert!(Arc::ptr_eq(&a.store, &b.store));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_configs_get_distinct_handles() {
        let registry = StoreRegistry::new();
        let a = registry
            .open(&StorageConfig::from_url("memory:"))
            .unwrap();
        let mut other = StorageConfig::from_url("memory:");
        other.options = Some("{}".to_string());
        let b = registry.open(&other).unwrap();
        assert!(!Arc::ptr_eq(&a.store, &b.store));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_evict_reopens() {
        let registry = StoreRegistry::new();
        let config = StorageConfig::from_url("memory:");
        let a = registry.open(&config).unwrap();
        registry.evict(&config);
        let b = registry.open(&config).unwrap();
        assert!(!Arc::ptr_eq(&a.store, &b.store));
    }
}
