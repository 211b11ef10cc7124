//! The engine façade.
//!
//! A [`Filterlist`] owns the list state and derives its request parameters
//! reactively from the data store, the user overlays and the persistence
//! overlay. Mutations compute the next parameters and push them into the
//! store; a single effect watching the derived parameters dispatches the
//! load. Changes made to the store from outside take the same path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};

use crate::error::{ConfigError, FilterlistError, LoadFailure};
use crate::events::{EventBus, EventType, ListenerId};
use crate::lifecycle::{RequestId, RequestTracker};
use crate::loader::{ItemLoader, LoadHandle};
use crate::options::Options;
use crate::overlay::{OverlayStack, ParamsOverlay};
use crate::params::{assign, Filters, RequestParams, Sort};
use crate::persist::{DurableStorage, MemoryStorage, PersistenceOverlay};
use crate::reactive::{batch, untrack, Effect, Memo};
use crate::state::{ListState, LoadAction};
use crate::store::{DataStore, DataStoreFactory, MemoryStore};

/// Bounds shared by items, additional data and error payloads.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

/// Decides on each auto-refresh tick whether to reload now.
pub type ShouldRefresh<I, A, E> = Arc<dyn Fn(&ListState<I, A, E>) -> bool + Send + Sync>;

/// Partial update for [`Filterlist::update_state_and_request`].
///
/// Fields left as `None` keep their current value. `page_size` is doubly
/// optional so the page size can be cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub filters: Option<Filters>,
    pub applied_filters: Option<Filters>,
    pub sort: Option<Sort>,
    pub page: Option<u32>,
    pub page_size: Option<Option<u32>>,
}

struct Shared<I, A, E> {
    options: Options,
    loader: Arc<dyn ItemLoader<I, A, E>>,
    store: Arc<dyn DataStore>,
    persistence: Option<Arc<PersistenceOverlay>>,
    request_params: Memo<RequestParams>,
    state: RwLock<ListState<I, A, E>>,
    tracker: RequestTracker,
    events: EventBus<ListState<I, A, E>>,
    should_refresh: ShouldRefresh<I, A, E>,
    /// Parameters the effect last acted on.
    last_params: Mutex<Option<RequestParams>>,
    /// Parameters the engine itself just pushed.
    pending_internal: Mutex<Option<RequestParams>>,
    /// Load dispatched by the last effect run, for the pushing caller.
    last_dispatch: Mutex<Option<LoadHandle>>,
    destroyed: AtomicBool,
}

impl<I: Payload, A: Payload, E: Payload> Shared<I, A, E> {
    fn params(&self) -> RequestParams {
        self.request_params.get_untracked()
    }

    fn snapshot(&self) -> ListState<I, A, E> {
        self.state.read().clone()
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn publish(&self, event: EventType, state: &ListState<I, A, E>) {
        self.events.emit(event, state);
        if event != EventType::ChangeListState {
            self.events.emit(EventType::ChangeListState, state);
        }
    }

    /// Emit `event` with the current state, without replacing it.
    fn emit(&self, event: EventType) {
        let state = self.snapshot();
        self.events.emit(event, &state);
    }

    fn try_replace_state<Err>(
        &self,
        event: EventType,
        f: impl FnOnce(&ListState<I, A, E>) -> Result<ListState<I, A, E>, Err>,
    ) -> Result<(), Err> {
        let next = {
            let mut state = self.state.write();
            let next = f(&state)?;
            *state = next.clone();
            next
        };
        self.publish(event, &next);
        Ok(())
    }

    fn replace_state(&self, event: EventType, f: impl FnOnce(&ListState<I, A, E>) -> ListState<I, A, E>) {
        let _ = self.try_replace_state::<std::convert::Infallible>(event, |state| Ok(f(state)));
    }

    /// `state` as a mutation that is about to load should publish it:
    /// loading, and emptied first if the load replaces the items.
    fn loading_from(&self, state: &ListState<I, A, E>, action: LoadAction) -> ListState<I, A, E> {
        if self.is_destroyed() {
            return state.clone();
        }
        state.begin_load(action, self.options.save_items_while_load)
    }

    fn force_always_reset(&self, filters: &mut Filters) {
        for (name, value) in &self.options.always_reset_filters {
            filters.insert(name.clone(), value.clone());
        }
    }

    fn fallback(&self, name: &str) -> Option<Value> {
        self.options.reset_filters_to.get(name).cloned()
    }

    /// Filter or sort transition: update both filter layers, force the
    /// always-reset filters and go back to the first page.
    fn apply_transition(
        self: &Arc<Self>,
        event: EventType,
        update: impl FnOnce(&mut Filters, &mut RequestParams),
    ) -> Option<LoadHandle> {
        let mut next = self.params();
        self.replace_state(event, |state| {
            let mut filters = state.filters.clone();
            update(&mut filters, &mut next);
            self.force_always_reset(&mut filters);
            self.force_always_reset(&mut next.applied_filters);
            ListState {
                filters,
                ..self.loading_from(state, LoadAction::ChangeRequestParams)
            }
        });
        next.page = 1;
        self.push_params(next)
    }

    /// Push new parameters through the store.
    ///
    /// Returns the handle of the load the push dispatched, which is `None`
    /// when an enclosing [`batch`] defers the dispatch.
    fn push_params(self: &Arc<Self>, next: RequestParams) -> Option<LoadHandle> {
        if self.is_destroyed() {
            return None;
        }
        self.emit(EventType::ChangeLoadParams);
        self.last_dispatch.lock().take();

        let unchanged = batch(|| {
            if let Some(persistence) = &self.persistence {
                persistence.write_through(&next);
            }
            self.store.set_value(next);

            let expected = self.params();
            let unchanged = self.last_params.lock().as_ref() == Some(&expected);
            if !unchanged {
                *self.pending_internal.lock() = Some(expected);
            }
            unchanged
        });

        if unchanged {
            trace!("request params unchanged, requesting again");
            return self.request_items(LoadAction::ChangeRequestParams);
        }
        self.last_dispatch.lock().take()
    }

    /// Effect body: react to the derived request parameters.
    fn on_params(self: &Arc<Self>, params: RequestParams) {
        let previous = self.last_params.lock().replace(params.clone());

        let Some(previous) = previous else {
            if self.options.autoload {
                let handle = self.request_items(LoadAction::Init);
                *self.last_dispatch.lock() = handle;
            }
            return;
        };
        if previous == params {
            return;
        }

        let internal = {
            let mut pending = self.pending_internal.lock();
            if pending.as_ref() == Some(&params) {
                pending.take();
                true
            } else {
                false
            }
        };

        if internal {
            self.emit(EventType::ChangeRequestParams);
        } else {
            debug!(page = params.page, "request params changed outside the engine");
            let applied = params.applied_filters.clone();
            self.replace_state(EventType::ChangeRequestParams, |state| ListState {
                filters: applied,
                ..self.loading_from(state, LoadAction::ChangeRequestParams)
            });
        }

        let handle = self.request_items(LoadAction::ChangeRequestParams);
        *self.last_dispatch.lock() = handle;
    }

    /// Start a request for the current parameters.
    fn request_items(self: &Arc<Self>, action: LoadAction) -> Option<LoadHandle> {
        if self.is_destroyed() {
            return None;
        }
        let params = self.params();

        let (id, prev) = {
            let mut state = self.state.write();
            let id = self.tracker.begin();
            let next = state.begin_load(action, self.options.save_items_while_load);
            *state = next.clone();
            (id, next)
        };
        debug!(request_id = id.raw(), ?action, "dispatching request");
        self.publish(EventType::RequestItems, &prev);

        let shared = Arc::clone(self);
        let task = self
            .tracker
            .spawn(async move { shared.run_request(id, params, prev, action).await });
        Some(LoadHandle::new(task))
    }

    async fn run_request(
        self: Arc<Self>,
        id: RequestId,
        params: RequestParams,
        prev: ListState<I, A, E>,
        action: LoadAction,
    ) -> Result<(), FilterlistError> {
        if !self.tracker.debounce(id).await {
            return Ok(());
        }

        let committed = match self.loader.load(params, prev, action).await {
            Ok(response) => self.commit(id, EventType::LoadItemsSuccess, |state| state.commit_success(response)),
            Err(LoadFailure::List(err)) => self.commit(id, EventType::LoadItemsError, |state| {
                state.commit_error(err.error, err.additional, err.total)
            }),
            Err(LoadFailure::Defect(err)) => {
                if !self.tracker.is_current(id) {
                    trace!(request_id = id.raw(), "discarding stale loader defect");
                    return Ok(());
                }
                error!(request_id = id.raw(), error = %err, "item loader failed");
                return Err(FilterlistError::Loader(err));
            }
        };

        if committed {
            self.schedule_refresh(id);
        }
        Ok(())
    }

    /// Commit a settlement if `id` is still the latest request.
    fn commit(
        &self,
        id: RequestId,
        event: EventType,
        f: impl FnOnce(&ListState<I, A, E>) -> ListState<I, A, E>,
    ) -> bool {
        let next = {
            let mut state = self.state.write();
            if self.is_destroyed() || !self.tracker.is_current(id) {
                trace!(request_id = id.raw(), "discarding stale result");
                return false;
            }
            let next = f(&state);
            *state = next.clone();
            next
        };
        debug!(request_id = id.raw(), ?event, "committed request");
        self.publish(event, &next);
        true
    }

    fn schedule_refresh(self: &Arc<Self>, id: RequestId) {
        let check: Weak<Self> = Arc::downgrade(self);
        let fire = check.clone();

        self.tracker.schedule_refresh(
            move || match check.upgrade() {
                Some(shared) => {
                    let state = shared.snapshot();
                    (shared.should_refresh)(&state)
                }
                None => true,
            },
            move || {
                let Some(shared) = fire.upgrade() else {
                    return;
                };
                shared.tracker.detach_refresh();
                if !shared.tracker.is_current(id) {
                    return;
                }
                trace!(request_id = id.raw(), "auto-refresh");
                shared.request_items(LoadAction::Reload);
            },
        );
    }

    fn edit_items(
        &self,
        event: EventType,
        additional: Option<A>,
        edit: impl FnOnce(&mut Vec<I>) -> Result<(), FilterlistError>,
    ) -> Result<(), FilterlistError> {
        self.try_replace_state(event, |state| {
            let mut items = state.items.clone();
            edit(&mut items)?;
            Ok(ListState {
                items,
                additional: additional.or_else(|| state.additional.clone()),
                ..state.clone()
            })
        })
    }
}

/// A filterable, sortable, paginated list backed by an async item loader.
///
/// Only the latest dispatched request ever commits to the list state.
/// Load-triggering methods return a [`LoadHandle`] that resolves once that
/// request settles; awaiting it is how loader defects reach the caller.
pub struct Filterlist<I, A = (), E = ()>
where
    I: Payload,
    A: Payload,
    E: Payload,
{
    shared: Arc<Shared<I, A, E>>,
    params_effect: Effect,
}

impl<I: Payload, A: Payload, E: Payload> Filterlist<I, A, E> {
    pub fn builder() -> FilterlistBuilder<I, A, E> {
        FilterlistBuilder::new()
    }

    /// Snapshot of the list state.
    pub fn list_state(&self) -> ListState<I, A, E> {
        self.shared.snapshot()
    }

    /// Current request parameters, overlays included.
    pub fn request_params(&self) -> RequestParams {
        self.shared.params()
    }

    pub fn store(&self) -> Arc<dyn DataStore> {
        Arc::clone(&self.shared.store)
    }

    pub fn options(&self) -> &Options {
        &self.shared.options
    }

    /// Handle of the load most recently dispatched by a parameter change
    /// that no caller has claimed yet, such as the initial autoload.
    pub fn take_pending_load(&self) -> Option<LoadHandle> {
        self.shared.last_dispatch.lock().take()
    }

    pub fn subscribe<F>(&self, event: EventType, listener: F) -> ListenerId
    where
        F: Fn(&ListState<I, A, E>) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(event, listener)
    }

    pub fn unsubscribe(&self, event: EventType, id: ListenerId) -> bool {
        self.shared.events.unsubscribe(event, id)
    }

    /// Set an intermediate filter value. `None` unsets it. Does not load.
    pub fn set_filter_value(&self, name: &str, value: Option<Value>) {
        self.shared.replace_state(EventType::SetFilterValue, |state| {
            let mut filters = state.filters.clone();
            assign(&mut filters, name, value);
            ListState {
                filters,
                ..state.clone()
            }
        });
    }

    /// Merge intermediate filter values. Does not load.
    pub fn set_filters_values(&self, values: Filters) {
        self.shared.replace_state(EventType::SetFiltersValues, |state| {
            let mut filters = state.filters.clone();
            filters.extend(values);
            ListState {
                filters,
                ..state.clone()
            }
        });
    }

    /// Copy the intermediate value of `name` into the applied filters.
    pub fn apply_filter(&self, name: &str) -> Option<LoadHandle> {
        self.shared.apply_transition(EventType::ApplyFilter, |filters, params| {
            assign(&mut params.applied_filters, name, filters.get(name).cloned());
        })
    }

    pub fn apply_filters(&self, names: &[&str]) -> Option<LoadHandle> {
        self.shared.apply_transition(EventType::ApplyFilters, |filters, params| {
            for name in names {
                assign(&mut params.applied_filters, name, filters.get(*name).cloned());
            }
        })
    }

    pub fn set_and_apply_filter(&self, name: &str, value: Option<Value>) -> Option<LoadHandle> {
        self.shared.apply_transition(EventType::SetAndApplyFilter, |filters, params| {
            assign(filters, name, value.clone());
            assign(&mut params.applied_filters, name, value);
        })
    }

    pub fn set_and_apply_filters(&self, values: Filters) -> Option<LoadHandle> {
        self.shared.apply_transition(EventType::SetAndApplyFilters, |filters, params| {
            for (name, value) in values {
                filters.insert(name.clone(), value.clone());
                params.applied_filters.insert(name, value);
            }
        })
    }

    /// Set and apply only the filters whose applied value is undefined.
    pub fn set_and_apply_empty_filters(&self, values: Filters) -> Option<LoadHandle> {
        self.shared.apply_transition(EventType::SetAndApplyEmptyFilters, |filters, params| {
            for (name, value) in values {
                if params.applied_filters.contains_key(&name) {
                    continue;
                }
                filters.insert(name.clone(), value.clone());
                params.applied_filters.insert(name, value);
            }
        })
    }

    /// Restore `name` to its configured fallback, undefined if none.
    pub fn reset_filter(&self, name: &str) -> Option<LoadHandle> {
        let shared = &self.shared;
        shared.apply_transition(EventType::ResetFilter, |filters, params| {
            let value = shared.fallback(name);
            assign(filters, name, value.clone());
            assign(&mut params.applied_filters, name, value);
        })
    }

    pub fn reset_filters(&self, names: &[&str]) -> Option<LoadHandle> {
        let shared = &self.shared;
        shared.apply_transition(EventType::ResetFilters, |filters, params| {
            for name in names {
                let value = shared.fallback(name);
                assign(filters, name, value.clone());
                assign(&mut params.applied_filters, name, value);
            }
        })
    }

    /// Reset every filter except those configured to survive.
    pub fn reset_all_filters(&self) -> Option<LoadHandle> {
        let shared = &self.shared;
        let saved = &shared.options.save_filters_on_reset_all;
        shared.apply_transition(EventType::ResetAllFilters, |filters, params| {
            let mut names: Vec<String> = Vec::new();
            for name in filters
                .keys()
                .chain(params.applied_filters.keys())
                .chain(shared.options.reset_filters_to.keys())
            {
                if !names.contains(name) && !saved.contains(name) {
                    names.push(name.clone());
                }
            }
            for name in &names {
                let value = shared.fallback(name);
                assign(filters, name, value.clone());
                assign(&mut params.applied_filters, name, value);
            }
        })
    }

    /// Sort by `param`.
    ///
    /// Without an explicit direction, sorting by the current column toggles
    /// it and sorting by a new column uses the default direction.
    pub fn set_sorting(&self, param: &str, asc: Option<bool>) -> Option<LoadHandle> {
        let default_asc = self.shared.options.is_default_sort_asc;
        self.shared.apply_transition(EventType::SetSorting, |_, params| {
            let asc = asc.unwrap_or_else(|| {
                if params.sort.param.as_deref() == Some(param) {
                    !params.sort.asc
                } else {
                    default_asc
                }
            });
            params.sort = Sort::new(param, asc);
        })
    }

    pub fn reset_sorting(&self) -> Option<LoadHandle> {
        let default_asc = self.shared.options.is_default_sort_asc;
        self.shared.apply_transition(EventType::ResetSorting, |_, params| {
            params.sort = Sort::unsorted(default_asc);
        })
    }

    /// Go to `page`. Pages start at 1; 0 is treated as 1.
    pub fn set_page(&self, page: u32) -> Option<LoadHandle> {
        self.shared.replace_state(EventType::SetPage, |state| {
            self.shared.loading_from(state, LoadAction::ChangeRequestParams)
        });
        let next = self.shared.params().with_page(page.max(1));
        self.shared.push_params(next)
    }

    pub fn set_page_size(&self, page_size: Option<u32>) -> Option<LoadHandle> {
        self.shared.replace_state(EventType::SetPageSize, |state| {
            self.shared.loading_from(state, LoadAction::ChangeRequestParams)
        });
        let next = RequestParams {
            page_size,
            ..self.shared.params()
        };
        self.shared.push_params(next)
    }

    /// Load the next chunk, appending to the current items.
    pub fn load_more(&self) -> Option<LoadHandle> {
        self.shared.replace_state(EventType::LoadMore, |state| {
            self.shared.loading_from(state, LoadAction::LoadMore)
        });
        self.shared.request_items(LoadAction::LoadMore)
    }

    /// Re-issue the current request.
    pub fn reload(&self) -> Option<LoadHandle> {
        self.shared.replace_state(EventType::Reload, |state| {
            self.shared.loading_from(state, LoadAction::Reload)
        });
        self.shared.request_items(LoadAction::Reload)
    }

    /// Apply several changes at once and load once.
    ///
    /// Changing applied filters or sorting without an explicit page goes
    /// back to the first page.
    pub fn update_state_and_request(&self, update: StateUpdate) -> Option<LoadHandle> {
        let shared = &self.shared;
        let mut next = shared.params();
        let StateUpdate {
            filters,
            applied_filters,
            sort,
            page,
            page_size,
        } = update;

        if let Some(mut applied) = applied_filters {
            shared.force_always_reset(&mut applied);
            next = next.with_applied_filters(applied);
        }
        if let Some(sort) = sort {
            next = next.with_sort(sort);
        }
        if let Some(page_size) = page_size {
            next.page_size = page_size;
        }
        if let Some(page) = page {
            next.page = page.max(1);
        }

        shared.replace_state(EventType::UpdateStateAndRequest, |state| ListState {
            filters: filters.unwrap_or_else(|| state.filters.clone()),
            ..shared.loading_from(state, LoadAction::ChangeRequestParams)
        });
        shared.push_params(next)
    }

    /// Insert `item` at `index`, shifting later items. Does not load.
    pub fn insert_item(&self, index: usize, item: I, additional: Option<A>) -> Result<(), FilterlistError> {
        self.shared.edit_items(EventType::InsertItem, additional, |items| {
            if index > items.len() {
                return Err(FilterlistError::ItemIndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, item);
            Ok(())
        })
    }

    pub fn delete_item(&self, index: usize, additional: Option<A>) -> Result<(), FilterlistError> {
        self.shared.edit_items(EventType::DeleteItem, additional, |items| {
            if index >= items.len() {
                return Err(FilterlistError::ItemIndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.remove(index);
            Ok(())
        })
    }

    pub fn update_item(&self, index: usize, item: I, additional: Option<A>) -> Result<(), FilterlistError> {
        self.shared.edit_items(EventType::UpdateItem, additional, |items| {
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(FilterlistError::ItemIndexOutOfRange { index, len })?;
            *slot = item;
            Ok(())
        })
    }

    /// Overwrite `total`. Does not load.
    pub fn set_total(&self, total: Option<u64>) {
        self.shared
            .replace_state(EventType::ChangeListState, |state| ListState {
                total,
                ..state.clone()
            });
    }

    /// Stop the engine: in-flight results are discarded, timers are
    /// cancelled and store changes are no longer followed. Idempotent.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("destroying filterlist");
        self.shared.tracker.destroy();
        self.params_effect.dispose();
        self.shared.events.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.is_destroyed()
    }
}

impl<I: Payload, A: Payload, E: Payload> Drop for Filterlist<I, A, E> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<I: Payload, A: Payload, E: Payload> std::fmt::Debug for Filterlist<I, A, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filterlist")
            .field("request_params", &self.request_params())
            .field("request_id", &self.shared.tracker.current().raw())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Assembles a [`Filterlist`] from options and collaborators.
pub struct FilterlistBuilder<I, A = (), E = ()> {
    options: Options,
    loader: Option<Arc<dyn ItemLoader<I, A, E>>>,
    store: Option<DataStoreFactory>,
    storage: Option<Arc<dyn DurableStorage>>,
    overlays: Vec<Arc<dyn ParamsOverlay>>,
    should_refresh: Option<ShouldRefresh<I, A, E>>,
    items: Vec<I>,
    additional: Option<A>,
    runtime: Option<Handle>,
}

impl<I: Payload, A: Payload, E: Payload> Default for FilterlistBuilder<I, A, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Payload, A: Payload, E: Payload> FilterlistBuilder<I, A, E> {
    pub fn new() -> Self {
        Self {
            options: Options::default(),
            loader: None,
            store: None,
            storage: None,
            overlays: Vec::new(),
            should_refresh: None,
            items: Vec::new(),
            additional: None,
            runtime: None,
        }
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn loader(mut self, loader: impl ItemLoader<I, A, E>) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Store factory. Defaults to a [`MemoryStore`].
    pub fn store(mut self, factory: DataStoreFactory) -> Self {
        self.store = Some(factory);
        self
    }

    /// Durable storage for `Options::persist`. Defaults to a
    /// [`MemoryStorage`] when persistence is configured.
    pub fn storage(mut self, storage: Arc<dyn DurableStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Add an overlay. Overlays apply in the order added, before persistence.
    pub fn overlay(mut self, overlay: Arc<dyn ParamsOverlay>) -> Self {
        self.overlays.push(overlay);
        self
    }

    pub fn should_refresh<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ListState<I, A, E>) -> bool + Send + Sync + 'static,
    {
        self.should_refresh = Some(Arc::new(predicate));
        self
    }

    /// Seed the list with items that are shown before the first load.
    pub fn items(mut self, items: Vec<I>) -> Self {
        self.items = items;
        self
    }

    pub fn additional(mut self, additional: A) -> Self {
        self.additional = Some(additional);
        self
    }

    /// Runtime for loads and timers. Defaults to the current runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<Filterlist<I, A, E>, ConfigError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?,
        };
        let loader = self.loader.ok_or(ConfigError::MissingLoader)?;
        let options = self.options;

        let initial = options.initial_request_params();
        let store = match self.store {
            Some(factory) => factory(&initial),
            None => Arc::new(MemoryStore::new(initial)) as Arc<dyn DataStore>,
        };

        let persistence = if options.persist.is_empty() {
            None
        } else {
            let storage = self.storage.unwrap_or_else(|| {
                warn!("persistence configured without storage, using in-memory storage");
                Arc::new(MemoryStorage::new())
            });
            Some(Arc::new(PersistenceOverlay::load(options.persist.clone(), storage)))
        };

        let overlays = OverlayStack::new(
            self.overlays,
            persistence.clone().map(|p| p as Arc<dyn ParamsOverlay>),
        );
        let request_params = {
            let store = Arc::clone(&store);
            Memo::new(move || overlays.apply(store.value()))
        };

        let mut filters = options.initial_filters();
        filters.extend(request_params.get_untracked().applied_filters);
        let state = ListState {
            filters,
            items: self.items,
            additional: self.additional,
            total: options.total,
            ..ListState::default()
        };

        let tracker = RequestTracker::new(runtime, options.debounce_timeout, options.refresh_timeout);
        let should_refresh = self.should_refresh.unwrap_or_else(|| Arc::new(|_: &ListState<I, A, E>| true));

        let shared = Arc::new(Shared {
            options,
            loader,
            store,
            persistence,
            request_params,
            state: RwLock::new(state),
            tracker,
            events: EventBus::new(),
            should_refresh,
            last_params: Mutex::new(None),
            pending_internal: Mutex::new(None),
            last_dispatch: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });

        let params_effect = {
            let weak = Arc::downgrade(&shared);
            Effect::new(move || {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let params = shared.request_params.get();
                untrack(|| shared.on_params(params));
            })
        };

        Ok(Filterlist {
            shared,
            params_effect,
        })
    }
}
