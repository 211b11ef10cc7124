//! Signals
//!
//! A signal is the writable cell of the graph. Reads inside a memo or an
//! effect are recorded by the runtime; writes invalidate whatever recorded
//! a read. Clones share one cell.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::{ReactiveHandle, Runtime};
use crate::graph::NodeId;

struct Cell<T> {
    registration: ReactiveHandle,
    value: RwLock<T>,
}

/// Writable reactive cell.
///
/// ```rust
/// use filterlist_core::reactive::Signal;
///
/// let query = Signal::new(String::from("?page=2"));
/// query.set(String::from("?page=3"));
/// assert_eq!(query.get(), "?page=3");
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    cell: Arc<Cell<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        let registration = Runtime::register_source(NodeId::new());
        Self {
            cell: Arc::new(Cell {
                registration,
                value: RwLock::new(value),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.cell.registration.node_id()
    }

    /// Clone the value out, recording the read.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Clone the value out without recording the read.
    pub fn get_untracked(&self) -> T {
        self.cell.value.read().clone()
    }

    /// Look at the value in place, recording the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track(self.id());
        let value = self.cell.value.read();
        f(&value)
    }

    /// Replace the value and invalidate readers, even if it is equal.
    pub fn set(&self, value: T) {
        *self.cell.value.write() = value;
        Runtime::notify_changed(self.id());
    }

    /// Replace the value unless it is equal to the current one.
    ///
    /// Returns whether readers were invalidated.
    pub fn set_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        let mut current = self.cell.value.write();
        if *current == value {
            return false;
        }
        *current = value;
        drop(current);

        Runtime::notify_changed(self.id());
        true
    }

    /// Number of cells that read this signal on their last run.
    pub fn subscriber_count(&self) -> usize {
        Runtime::dependent_count(self.id())
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signal").field(&*self.cell.value.read()).finish()
    }
}
