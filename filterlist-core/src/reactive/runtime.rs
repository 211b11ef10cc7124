//! Runtime
//!
//! Process-wide registry of live cells plus the graph of who read whom.
//! A write asks the graph for everything downstream, flags memos stale and
//! queues effects on the calling thread's batch. User code never runs while
//! the registry lock is held.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::batch;
use super::context::ReactiveContext;
use crate::graph::{NodeId, NodeKind, DependencyGraph};

/// A trait for cells that can be invalidated by the runtime.
pub trait Reactive: Send + Sync {
    /// Get the graph node of this cell.
    fn node_id(&self) -> NodeId;

    /// Mark the cell as needing recomputation.
    fn mark_dirty(&self);

    /// Run the cell (effects only).
    fn run(&self);

    /// Check if this cell is an effect (eager) or memo (lazy).
    fn is_eager(&self) -> bool;
}

/// Handle to a registered node.
///
/// Dropping this handle removes the node and its edges from the runtime.
#[derive(Debug)]
pub struct ReactiveHandle {
    node: NodeId,
}

impl ReactiveHandle {
    /// The node this handle keeps registered.
    pub fn node_id(&self) -> NodeId {
        self.node
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.node);
    }
}

#[derive(Default)]
struct RuntimeState {
    graph: DependencyGraph,
    /// Weak references so the runtime never keeps a cell alive.
    registry: HashMap<NodeId, Weak<dyn Reactive>>,
}

static RUNTIME: OnceLock<Mutex<RuntimeState>> = OnceLock::new();

fn state() -> &'static Mutex<RuntimeState> {
    RUNTIME.get_or_init(|| Mutex::new(RuntimeState::default()))
}

/// Entry points into the process-wide registry.
pub struct Runtime;

impl Runtime {
    /// Register a plain source node (a signal).
    pub fn register_source(node: NodeId) -> ReactiveHandle {
        state().lock().graph.insert(node, NodeKind::Source);
        ReactiveHandle { node }
    }

    /// Register a memo or effect.
    pub fn register(node: NodeId, kind: NodeKind, reactive: Weak<dyn Reactive>) -> ReactiveHandle {
        let mut state = state().lock();
        state.graph.insert(node, kind);
        state.registry.insert(node, reactive);
        ReactiveHandle { node }
    }

    fn unregister(node: NodeId) {
        let mut state = state().lock();
        state.graph.remove(node);
        state.registry.remove(&node);
    }

    /// Record a read of `node` by the current computation, if any.
    pub fn track(node: NodeId) {
        if let Some(subscriber) = ReactiveContext::track_dependency(node) {
            state().lock().graph.link(node, subscriber);
        }
    }

    /// Remove all incoming edges of `node` before it re-runs.
    pub fn clear_dependencies(node: NodeId) {
        state().lock().graph.unlink_sources(node);
    }

    /// Propagate a change of `node` through the graph.
    pub fn notify_changed(node: NodeId) {
        let affected: Vec<Arc<dyn Reactive>> = {
            let state = state().lock();
            state
                .graph
                .invalidation_order(node)
                .into_iter()
                .filter_map(|id| state.registry.get(&id).and_then(Weak::upgrade))
                .collect()
        };

        if affected.is_empty() {
            return;
        }
        trace!(node = node.raw(), affected = affected.len(), "propagating change");

        for reactive in affected {
            reactive.mark_dirty();
            if reactive.is_eager() {
                batch::enqueue(reactive);
            }
        }

        batch::flush();
    }

    /// Number of dependents currently recorded for `node`.
    pub fn dependent_count(node: NodeId) -> usize {
        state()
            .lock()
            .graph
            .node(node)
            .map_or(0, |n| n.observers().len())
    }
}
