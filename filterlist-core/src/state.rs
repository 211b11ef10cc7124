//! List state: what subscribers render.

use serde::Serialize;

use crate::params::Filters;

/// Why a load was dispatched. Passed through to the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadAction {
    /// First load at construction.
    Init,
    /// Explicit reload or auto-refresh.
    Reload,
    /// Next chunk for infinite scrolling; items accumulate.
    LoadMore,
    /// Sorting, filters or pagination changed.
    ChangeRequestParams,
}

impl LoadAction {
    /// Whether the next successful load replaces the current items.
    pub fn cleans_items(self) -> bool {
        !matches!(self, LoadAction::LoadMore)
    }
}

/// Snapshot of the list.
///
/// Replaced wholesale on every transition so subscribers can diff by value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListState<I, A, E> {
    /// Intermediate (not yet applied) filter values.
    pub filters: Filters,
    pub loading: bool,
    pub items: Vec<I>,
    pub loaded_pages: u32,
    pub additional: Option<A>,
    pub error: Option<E>,
    /// The next successful load replaces `items` instead of appending.
    pub should_clean: bool,
    pub is_first_load: bool,
    pub total: Option<u64>,
}

impl<I, A, E> Default for ListState<I, A, E> {
    fn default() -> Self {
        Self {
            filters: Filters::new(),
            loading: false,
            items: Vec::new(),
            loaded_pages: 0,
            additional: None,
            error: None,
            should_clean: true,
            is_first_load: true,
            total: None,
        }
    }
}

/// Successful loader result.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemsResponse<I, A> {
    pub items: Vec<I>,
    /// Replaces `ListState::additional` when present.
    pub additional: Option<A>,
    pub total: Option<u64>,
    /// Overrides the engine's own page counting when present.
    pub loaded_pages: Option<u32>,
}

impl<I, A> ItemsResponse<I, A> {
    pub fn new(items: Vec<I>) -> Self {
        Self {
            items,
            additional: None,
            total: None,
            loaded_pages: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_additional(mut self, additional: A) -> Self {
        self.additional = Some(additional);
        self
    }

    pub fn with_loaded_pages(mut self, loaded_pages: u32) -> Self {
        self.loaded_pages = Some(loaded_pages);
        self
    }
}

impl<I, A, E> ListState<I, A, E>
where
    I: Clone,
    A: Clone,
    E: Clone,
{
    /// Transition into loading for `action`.
    ///
    /// Non-accumulating loads drop the current items right away unless
    /// `save_items_while_load` is set; either way they are replaced on success.
    pub(crate) fn begin_load(&self, action: LoadAction, save_items_while_load: bool) -> Self {
        let should_clean = action.cleans_items();
        let items = if should_clean && !save_items_while_load {
            Vec::new()
        } else {
            self.items.clone()
        };
        Self {
            loading: true,
            items,
            should_clean,
            ..self.clone()
        }
    }

    /// Transition after a committed successful load.
    pub(crate) fn commit_success(&self, response: ItemsResponse<I, A>) -> Self {
        let (items, default_pages) = if self.should_clean {
            (response.items, 1)
        } else {
            let mut items = self.items.clone();
            items.extend(response.items);
            (items, self.loaded_pages + 1)
        };
        Self {
            filters: self.filters.clone(),
            loading: false,
            items,
            loaded_pages: response.loaded_pages.unwrap_or(default_pages),
            additional: response.additional.or_else(|| self.additional.clone()),
            error: None,
            should_clean: false,
            is_first_load: false,
            total: response.total,
        }
    }

    /// Transition after a committed expected failure.
    pub(crate) fn commit_error(&self, error: Option<E>, additional: Option<A>, total: Option<u64>) -> Self {
        Self {
            loading: false,
            error,
            additional: additional.or_else(|| self.additional.clone()),
            total: total.or(self.total),
            should_clean: false,
            is_first_load: false,
            ..self.clone()
        }
    }
}
