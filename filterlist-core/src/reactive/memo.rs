//! Memos
//!
//! A memo caches a value derived from other cells. Upstream writes only
//! flag it; the computation re-runs on the next read and re-records what it
//! reads, so branches that are no longer taken stop invalidating it.
//! A memo nobody reads never computes.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use crate::graph::{NodeId, NodeKind};

/// Whether a memo's cache can be served as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    Clean,
    /// Something the memo read was written, or it never computed.
    Dirty,
}

type Compute<T> = Box<dyn Fn() -> T + Send + Sync>;

struct Derived<T> {
    registration: ReactiveHandle,
    compute: Compute<T>,
    cache: RwLock<Option<T>>,
    stale: AtomicBool,
}

impl<T> Reactive for Derived<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn node_id(&self) -> NodeId {
        self.registration.node_id()
    }

    fn mark_dirty(&self) {
        self.stale.store(true, Ordering::Release);
    }

    fn run(&self) {}

    fn is_eager(&self) -> bool {
        false
    }
}

/// Lazily cached derived value.
///
/// Request parameters of a list are a memo over the store value and the
/// overlays, so that reading them twice without a write in between costs
/// one clone.
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    derived: Arc<Derived<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    pub fn new(compute: impl Fn() -> T + Send + Sync + 'static) -> Self {
        let id = NodeId::new();
        let derived = Arc::new_cyclic(|me: &Weak<Derived<T>>| {
            let me: Weak<dyn Reactive> = me.clone();
            Derived {
                registration: Runtime::register(id, NodeKind::Derived, me),
                compute: Box::new(compute),
                cache: RwLock::new(None),
                stale: AtomicBool::new(true),
            }
        });
        Self { derived }
    }

    pub fn id(&self) -> NodeId {
        self.derived.registration.node_id()
    }

    /// Current value, recomputed first if anything it read has changed.
    pub fn get(&self) -> T {
        Runtime::track(self.id());

        if !self.derived.stale.load(Ordering::Acquire) {
            if let Some(cached) = self.derived.cache.read().as_ref() {
                return cached.clone();
            }
        }
        self.refresh()
    }

    pub fn get_untracked(&self) -> T {
        super::untrack(|| self.get())
    }

    pub fn mark_dirty(&self) {
        self.derived.mark_dirty();
    }

    pub fn state(&self) -> MemoState {
        if self.derived.stale.load(Ordering::Acquire) {
            MemoState::Dirty
        } else {
            MemoState::Clean
        }
    }

    fn refresh(&self) -> T {
        // Cleared before computing so a write racing the computation
        // leaves the memo stale.
        self.derived.stale.store(false, Ordering::Release);
        Runtime::clear_dependencies(self.id());

        let value = {
            let _scope = ReactiveContext::enter(self.id());
            (self.derived.compute)()
        };
        *self.derived.cache.write() = Some(value.clone());
        value
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            derived: Arc::clone(&self.derived),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("state", &self.state())
            .field("cache", &*self.derived.cache.read())
            .finish()
    }
}
