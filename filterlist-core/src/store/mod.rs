//! External data stores.
//!
//! A store holds the request parameters outside the engine: in memory, in a
//! query string, anywhere a caller can read and write. The engine reads the
//! store inside its reactive graph, so a store whose value changes on its
//! own (back/forward navigation rewriting a URL) triggers a reload without
//! any explicit call.

mod codec;
mod memory;
mod string;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::params::RequestParams;
use crate::reactive::{untrack, Effect};

pub use codec::{ArrayFormat, QueryCodec, QueryKeys};
pub use memory::MemoryStore;
pub use string::StringStore;

/// Callback for store changes.
pub type StoreListener = Box<dyn Fn(&RequestParams) + Send + Sync>;

/// Builds a store from the engine's initial request parameters.
pub type DataStoreFactory = Box<dyn FnOnce(&RequestParams) -> Arc<dyn DataStore> + Send>;

/// The boundary between the engine and the externally owned parameters.
pub trait DataStore: Send + Sync {
    /// Current parameters. Reads are tracked by the reactive graph.
    fn value(&self) -> RequestParams;

    /// Replace the parameters.
    fn set_value(&self, next: RequestParams);

    /// Call `listener` after every change of [`DataStore::value`], whoever
    /// made it. Dropping the subscription unsubscribes.
    fn subscribe(&self, listener: StoreListener) -> StoreSubscription;
}

/// Live store subscription.
#[derive(Debug)]
pub struct StoreSubscription {
    effect: Effect,
}

impl StoreSubscription {
    /// Watch `read` and call `listener` whenever its value changes.
    ///
    /// The initial value is recorded but not reported.
    pub fn watch<R>(read: R, listener: StoreListener) -> Self
    where
        R: Fn() -> RequestParams + Send + Sync + 'static,
    {
        let last: Mutex<Option<RequestParams>> = Mutex::new(None);
        let effect = Effect::new(move || {
            let value = read();
            let previous = last.lock().replace(value.clone());
            if previous.is_some_and(|previous| previous != value) {
                untrack(|| listener(&value));
            }
        });
        Self { effect }
    }

    pub fn unsubscribe(self) {
        self.effect.dispose();
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        self.effect.dispose();
    }
}
