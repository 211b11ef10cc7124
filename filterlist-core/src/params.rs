//! Request parameters: the description of what is being requested.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter values by filter name. A missing key means "undefined".
pub type Filters = IndexMap<String, Value>;

/// Sorting column and direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    /// Sorted column, `None` when unsorted.
    pub param: Option<String>,
    pub asc: bool,
}

impl Sort {
    pub fn new(param: impl Into<String>, asc: bool) -> Self {
        Self {
            param: Some(param.into()),
            asc,
        }
    }

    /// No column, direction only.
    pub fn unsorted(asc: bool) -> Self {
        Self { param: None, asc }
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self::unsorted(true)
    }
}

/// What was requested: sorting, applied filters and pagination.
///
/// Values are replaced, never mutated in place, so equality tells whether a
/// request actually changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParams {
    pub sort: Sort,
    pub applied_filters: Filters,
    /// 1-based page number.
    pub page: u32,
    pub page_size: Option<u32>,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            sort: Sort::default(),
            applied_filters: Filters::new(),
            page: 1,
            page_size: None,
        }
    }
}

impl RequestParams {
    /// Copy with the given page.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Copy with the given applied filters, back on the first page.
    pub fn with_applied_filters(mut self, applied_filters: Filters) -> Self {
        self.applied_filters = applied_filters;
        self.page = 1;
        self
    }

    /// Copy with the given sort, back on the first page.
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self.page = 1;
        self
    }
}

/// Set `name` to `value`, or remove it when `value` is `None`.
pub(crate) fn assign(filters: &mut Filters, name: &str, value: Option<Value>) {
    match value {
        Some(value) => {
            filters.insert(name.to_string(), value);
        }
        None => {
            filters.shift_remove(name);
        }
    }
}
