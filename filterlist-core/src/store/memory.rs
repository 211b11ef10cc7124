use crate::params::RequestParams;
use crate::reactive::Signal;

use super::{DataStore, StoreListener, StoreSubscription};

/// Store backed by a single signal. The default when nothing else is wired.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    value: Signal<RequestParams>,
}

impl MemoryStore {
    pub fn new(initial: RequestParams) -> Self {
        Self {
            value: Signal::new(initial),
        }
    }

    /// The underlying signal, for callers that write it directly.
    pub fn signal(&self) -> Signal<RequestParams> {
        self.value.clone()
    }
}

impl DataStore for MemoryStore {
    fn value(&self) -> RequestParams {
        self.value.get()
    }

    fn set_value(&self, next: RequestParams) {
        self.value.set_if_changed(next);
    }

    fn subscribe(&self, listener: StoreListener) -> StoreSubscription {
        let value = self.value.clone();
        StoreSubscription::watch(move || value.get(), listener)
    }
}
