//! Durable storage and the persistence overlay.
//!
//! Filters bound to a storage key are read once at construction and then
//! override whatever the store says. Every push of new request parameters
//! writes those filters (and the page size, if bound) through to storage
//! before the parameters reach the reactive graph.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{trace, warn};

use crate::options::PersistConfig;
use crate::overlay::ParamsOverlay;
use crate::params::{Filters, RequestParams};
use crate::reactive::Signal;

/// Key-value storage that outlives the engine.
pub trait DurableStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-process storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Persisted values currently in effect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedValues {
    pub filters: Filters,
    pub page_size: Option<u32>,
}

/// Highest-precedence overlay backed by durable storage.
pub struct PersistenceOverlay {
    config: PersistConfig,
    storage: Arc<dyn DurableStorage>,
    values: Signal<PersistedValues>,
}

impl PersistenceOverlay {
    /// Read every bound key. Unreadable values count as absent.
    pub fn load(config: PersistConfig, storage: Arc<dyn DurableStorage>) -> Self {
        let mut values = PersistedValues::default();

        for (name, key) in &config.filters {
            if let Some(value) = read_json::<Value>(storage.as_ref(), key) {
                values.filters.insert(name.clone(), value);
            }
        }
        if let Some(key) = &config.page_size {
            values.page_size = read_json::<u32>(storage.as_ref(), key);
        }

        Self {
            config,
            storage,
            values: Signal::new(values),
        }
    }

    /// Persisted values, untracked.
    pub fn values(&self) -> PersistedValues {
        self.values.get_untracked()
    }

    /// Write the bound values of `params` to storage.
    ///
    /// A bound filter missing from `params` is removed from storage.
    pub fn write_through(&self, params: &RequestParams) {
        let mut next = PersistedValues::default();

        for (name, key) in &self.config.filters {
            match params.applied_filters.get(name) {
                Some(value) => {
                    self.storage.set(key, value.to_string());
                    next.filters.insert(name.clone(), value.clone());
                }
                None => self.storage.remove(key),
            }
        }
        if let Some(key) = &self.config.page_size {
            match params.page_size {
                Some(size) => self.storage.set(key, size.to_string()),
                None => self.storage.remove(key),
            }
            next.page_size = params.page_size;
        }

        if self.values.set_if_changed(next) {
            trace!("persisted values changed");
        }
    }
}

impl ParamsOverlay for PersistenceOverlay {
    fn name(&self) -> &str {
        "persistence"
    }

    fn apply(&self, params: &mut RequestParams) {
        self.values.with(|values| {
            for (name, value) in &values.filters {
                params.applied_filters.insert(name.clone(), value.clone());
            }
            if values.page_size.is_some() {
                params.page_size = values.page_size;
            }
        });
    }
}

fn read_json<T: serde::de::DeserializeOwned>(storage: &dyn DurableStorage, key: &str) -> Option<T> {
    let raw = storage.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "ignoring unreadable persisted value");
            None
        }
    }
}
