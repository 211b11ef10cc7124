//! Static engine options.
//!
//! Everything here is plain data and can be read from JSON. Collaborators
//! that are code (loader, store, storage, refresh predicate) are passed to
//! [`crate::FilterlistBuilder`] instead.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::params::{Filters, RequestParams, Sort};

/// Durable-storage bindings for applied values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistConfig {
    /// Filter name to storage key.
    pub filters: IndexMap<String, String>,
    /// Storage key for the page size.
    pub page_size: Option<String>,
}

impl PersistConfig {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.page_size.is_none()
    }
}

/// Options of one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Load immediately on construction.
    pub autoload: bool,
    /// Direction used when sorting by a new column.
    pub is_default_sort_asc: bool,
    /// Initial sorted column.
    pub sort: Option<String>,
    /// Initial intermediate filters; defaults to the applied ones.
    pub filters: Option<Filters>,
    /// Initial applied filters.
    pub applied_filters: Filters,
    pub page: u32,
    pub page_size: Option<u32>,
    /// Forced onto applied filters by every apply-style transition.
    pub always_reset_filters: Filters,
    /// Fallbacks restored by filter resets. Missing means undefined.
    pub reset_filters_to: Filters,
    /// Filters that survive `reset_all_filters`.
    pub save_filters_on_reset_all: Vec<String>,
    /// Keep showing old items while a cleaning load is in flight.
    pub save_items_while_load: bool,
    pub persist: PersistConfig,
    /// Delay before a dispatched request reaches the loader.
    pub debounce_timeout: Option<Duration>,
    /// Interval of automatic reloads after each committed load.
    pub refresh_timeout: Option<Duration>,
    pub total: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            autoload: true,
            is_default_sort_asc: true,
            sort: None,
            filters: None,
            applied_filters: Filters::new(),
            page: 1,
            page_size: None,
            always_reset_filters: Filters::new(),
            reset_filters_to: Filters::new(),
            save_filters_on_reset_all: Vec::new(),
            save_items_while_load: false,
            persist: PersistConfig::default(),
            debounce_timeout: None,
            refresh_timeout: None,
            total: None,
        }
    }
}

impl Options {
    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Request parameters the engine starts from, before the store and
    /// persisted values are merged in.
    pub fn initial_request_params(&self) -> RequestParams {
        let mut applied_filters = self.applied_filters.clone();
        applied_filters.extend(
            self.always_reset_filters
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        RequestParams {
            sort: Sort {
                param: self.sort.clone(),
                asc: self.is_default_sort_asc,
            },
            applied_filters,
            page: self.page.max(1),
            page_size: self.page_size,
        }
    }

    /// Initial intermediate filters.
    pub fn initial_filters(&self) -> Filters {
        self.filters
            .clone()
            .unwrap_or_else(|| self.applied_filters.clone())
    }
}
