//! Write Batching
//!
//! Writes are applied synchronously, but effects only run at a batch
//! boundary. A write outside any batch is its own batch, so it flushes
//! immediately; writes inside [`batch`] are coalesced and every affected
//! effect runs once when the outermost batch closes.
//!
//! Writes performed while effects are being flushed are not rejected: the
//! effects they schedule are appended to the queue and run in the same
//! flush.

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::IndexMap;

use super::runtime::Reactive;
use crate::graph::NodeId;

#[derive(Default)]
struct BatchState {
    depth: usize,
    flushing: bool,
    pending: IndexMap<NodeId, Arc<dyn Reactive>>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Run `f` with effect notification deferred until it returns.
///
/// Batches nest; only the outermost one flushes.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let result = {
        let _guard = DepthGuard::enter();
        f()
    };
    flush();
    result
}

/// Check if the current thread is inside a batch.
pub fn is_batching() -> bool {
    BATCH.with(|b| b.borrow().depth > 0)
}

/// Queue an effect for the next flush. Duplicate entries collapse.
pub(crate) fn enqueue(reactive: Arc<dyn Reactive>) {
    BATCH.with(|b| {
        b.borrow_mut()
            .pending
            .entry(reactive.node_id())
            .or_insert(reactive);
    });
}

/// Run queued effects, unless a batch is open or a flush is already running.
pub(crate) fn flush() {
    let Some(_flushing) = FlushGuard::begin() else {
        return;
    };

    loop {
        let next = BATCH.with(|b| b.borrow_mut().pending.shift_remove_index(0));
        match next {
            Some((_, reactive)) => reactive.run(),
            None => break,
        }
    }
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        BATCH.with(|b| b.borrow_mut().depth += 1);
        Self
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        BATCH.with(|b| b.borrow_mut().depth -= 1);
    }
}

struct FlushGuard;

impl FlushGuard {
    fn begin() -> Option<Self> {
        BATCH.with(|b| {
            let mut state = b.borrow_mut();
            if state.depth > 0 || state.flushing {
                return None;
            }
            state.flushing = true;
            Some(Self)
        })
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        BATCH.with(|b| b.borrow_mut().flushing = false);
    }
}
