//! Effects
//!
//! An effect is the eager end of the graph: it runs once when created,
//! recording what it reads, and again at the close of every batch in which
//! one of those cells was written. Writes the effect makes are deferred to
//! the same flush.
//!
//! A run may hand back a [`Cleanup`]. It runs before the next run, on
//! [`Effect::dispose`], or when the last handle is dropped, whichever comes
//! first.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::batch::batch;
use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use crate::graph::{NodeId, NodeKind};

/// Teardown handed back by an effect run.
pub type Cleanup = Box<dyn FnOnce() + Send>;

type Body = Box<dyn Fn() -> Option<Cleanup> + Send + Sync>;

struct Eager {
    registration: ReactiveHandle,
    body: Body,
    teardown: Mutex<Option<Cleanup>>,
    disposed: AtomicBool,
    runs: AtomicUsize,
}

impl Eager {
    fn id(&self) -> NodeId {
        self.registration.node_id()
    }

    fn execute(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        batch(|| {
            self.tear_down();
            Runtime::clear_dependencies(self.id());
            let next = {
                let _frame = ReactiveContext::enter(self.id());
                (self.body)()
            };
            *self.teardown.lock() = next;
        });
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    fn tear_down(&self) {
        let pending = self.teardown.lock().take();
        if let Some(cleanup) = pending {
            cleanup();
        }
    }
}

impl Drop for Eager {
    fn drop(&mut self) {
        if let Some(cleanup) = self.teardown.get_mut().take() {
            cleanup();
        }
    }
}

impl Reactive for Eager {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn mark_dirty(&self) {}

    fn run(&self) {
        self.execute();
    }

    fn is_eager(&self) -> bool {
        true
    }
}

/// Side effect that re-runs when what it read changes.
///
/// ```rust
/// use filterlist_core::reactive::{Effect, Signal};
/// use std::sync::Arc;
/// use parking_lot::Mutex;
///
/// let query = Signal::new(String::new());
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let (q, s) = (query.clone(), seen.clone());
/// let _sync = Effect::new(move || s.lock().push(q.get()));
///
/// query.set("?page=2".into());
/// assert_eq!(*seen.lock(), vec![String::new(), "?page=2".to_string()]);
/// ```
#[derive(Clone)]
pub struct Effect {
    eager: Arc<Eager>,
}

impl Effect {
    pub fn new(body: impl Fn() + Send + Sync + 'static) -> Self {
        Self::with_cleanup(move || {
            body();
            None
        })
    }

    /// Like [`Effect::new`], for bodies that hand back a teardown.
    pub fn with_cleanup(body: impl Fn() -> Option<Cleanup> + Send + Sync + 'static) -> Self {
        let id = NodeId::new();
        let eager = Arc::new_cyclic(|me: &Weak<Eager>| {
            let me: Weak<dyn Reactive> = me.clone();
            Eager {
                registration: Runtime::register(id, NodeKind::Effect, me),
                body: Box::new(body),
                teardown: Mutex::new(None),
                disposed: AtomicBool::new(false),
                runs: AtomicUsize::new(0),
            }
        });
        eager.execute();
        Self { eager }
    }

    pub fn id(&self) -> NodeId {
        self.eager.id()
    }

    /// Stop re-running and run the pending cleanup. Idempotent.
    pub fn dispose(&self) {
        if !self.eager.disposed.swap(true, Ordering::AcqRel) {
            self.eager.tear_down();
            Runtime::clear_dependencies(self.id());
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.eager.disposed.load(Ordering::Acquire)
    }

    pub fn run_count(&self) -> usize {
        self.eager.runs.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("runs", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
