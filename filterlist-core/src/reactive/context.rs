//! Read Tracking
//!
//! Each thread keeps a stack of the computations it is running. A read
//! reports itself to the top of the stack; the runtime turns that into a
//! graph edge. A `None` frame hides the frames below it, which is how
//! [`untrack`] keeps listener callbacks from subscribing the effect that
//! invoked them.

use std::cell::RefCell;

use crate::graph::NodeId;

thread_local! {
    static RUNNING: RefCell<Vec<Option<NodeId>>> = const { RefCell::new(Vec::new()) };
}

/// Frame on the tracking stack, popped on drop (unwinding included).
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct ReactiveContext {
    frame: Option<NodeId>,
}

impl ReactiveContext {
    /// Attribute reads to `computation` until the guard drops.
    pub fn enter(computation: NodeId) -> Self {
        Self::push(Some(computation))
    }

    /// Attribute reads to nobody until the guard drops.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(frame: Option<NodeId>) -> Self {
        RUNNING.with(|running| running.borrow_mut().push(frame));
        Self { frame }
    }

    pub fn current_subscriber() -> Option<NodeId> {
        RUNNING.with(|running| running.borrow().last().copied().flatten())
    }

    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// The computation a read of `node` should be attributed to.
    pub fn track_dependency(node: NodeId) -> Option<NodeId> {
        Self::current_subscriber().filter(|computation| *computation != node)
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = RUNNING.with(|running| running.borrow_mut().pop());
        debug_assert_eq!(popped, Some(self.frame), "tracking frames dropped out of order");
    }
}

/// Run `f` with its reads attributed to nobody.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _frame = ReactiveContext::untracked();
    f()
}
