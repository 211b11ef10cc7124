//! Typed publish/subscribe registry for state transitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use smallvec::SmallVec;

/// One event per kind of transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    SetFilterValue,
    ApplyFilter,
    SetAndApplyFilter,
    ResetFilter,
    SetFiltersValues,
    ApplyFilters,
    SetAndApplyFilters,
    SetAndApplyEmptyFilters,
    ResetFilters,
    ResetAllFilters,
    SetPage,
    SetPageSize,
    SetSorting,
    ResetSorting,
    LoadMore,
    Reload,
    UpdateStateAndRequest,
    InsertItem,
    DeleteItem,
    UpdateItem,
    RequestItems,
    LoadItemsSuccess,
    LoadItemsError,
    /// Emitted after every list state replacement, alongside the specific event.
    ChangeListState,
    /// A mutation produced new request parameters.
    ChangeLoadParams,
    /// The derived request parameters changed, from inside or outside the engine.
    ChangeRequestParams,
}

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;
type Listeners<S> = SmallVec<[(ListenerId, Listener<S>); 2]>;

/// Listener registry keyed by event type.
pub struct EventBus<S> {
    topics: RwLock<HashMap<EventType, Listeners<S>>>,
}

impl<S> Default for EventBus<S> {
    fn default() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }
}

impl<S> EventBus<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `event`.
    pub fn subscribe<F>(&self, event: EventType, listener: F) -> ListenerId
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.topics
            .write()
            .entry(event)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, event: EventType, id: ListenerId) -> bool {
        let mut topics = self.topics.write();
        let Some(listeners) = topics.get_mut(&event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        before != listeners.len()
    }

    /// Call every listener of `event` with `payload`.
    ///
    /// Listeners run outside the registry lock and may subscribe or emit.
    pub fn emit(&self, event: EventType, payload: &S) {
        let listeners: Listeners<S> = match self.topics.read().get(&event) {
            Some(listeners) => listeners.clone(),
            None => return,
        };
        for (_, listener) in listeners {
            listener(payload);
        }
    }

    pub fn listener_count(&self, event: EventType) -> usize {
        self.topics.read().get(&event).map_or(0, |l| l.len())
    }

    pub fn clear(&self) {
        self.topics.write().clear();
    }
}
