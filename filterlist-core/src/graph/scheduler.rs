//! Dependency Graph
//!
//! Edges point from a cell to the cells that read it. A write to a source
//! invalidates everything reachable from it; the graph answers with those
//! nodes ordered so that every node comes after the nodes it reads.

use std::collections::{HashMap, VecDeque};

use super::node::{Node, NodeId, NodeKind};

/// Read edges between every live cell.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<NodeId, Node>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`. Registering twice keeps the existing edges.
    pub fn insert(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes.entry(id).or_insert_with(|| Node::new(kind));
    }

    /// Forget `id` and unhook it from its neighbours.
    pub fn remove(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for source in node.sources() {
            if let Some(source) = self.nodes.get_mut(source) {
                source.unlink_observer(id);
            }
        }
        for observer in node.observers() {
            if let Some(observer) = self.nodes.get_mut(observer) {
                observer.unlink_source(id);
            }
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Record that `observer` read `source`.
    ///
    /// Self reads and reads involving unregistered nodes are ignored.
    pub fn link(&mut self, source: NodeId, observer: NodeId) {
        if source == observer || !self.nodes.contains_key(&observer) {
            return;
        }
        let Some(source_node) = self.nodes.get_mut(&source) else {
            return;
        };
        source_node.link_observer(observer);
        if let Some(observer_node) = self.nodes.get_mut(&observer) {
            observer_node.link_source(source);
        }
    }

    /// Drop everything `observer` read, ahead of a re-run that tracks anew.
    pub fn unlink_sources(&mut self, observer: NodeId) {
        let Some(node) = self.nodes.get_mut(&observer) else {
            return;
        };
        for source in node.drain_sources() {
            if let Some(source) = self.nodes.get_mut(&source) {
                source.unlink_observer(observer);
            }
        }
    }

    /// Nodes invalidated by a write to `source`, sources before observers.
    ///
    /// `source` itself is not part of the result.
    pub fn invalidation_order(&self, source: NodeId) -> Vec<NodeId> {
        // Reachable set with, for each node, how many of its reachable
        // sources have not been emitted yet.
        let mut pending: HashMap<NodeId, usize> = HashMap::new();
        let mut stack: Vec<NodeId> = self.observers_of(source).to_vec();
        while let Some(id) = stack.pop() {
            if pending.contains_key(&id) || !self.nodes.contains_key(&id) {
                continue;
            }
            pending.insert(id, 0);
            stack.extend_from_slice(self.observers_of(id));
        }
        let reachable: Vec<NodeId> = pending.keys().copied().collect();
        for id in &reachable {
            for observer in self.observers_of(*id) {
                if let Some(count) = pending.get_mut(observer) {
                    *count += 1;
                }
            }
        }

        let mut ready: VecDeque<NodeId> = self
            .observers_of(source)
            .iter()
            .copied()
            .filter(|id| pending.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(pending.len());
        while let Some(id) = ready.pop_front() {
            if order.contains(&id) {
                continue;
            }
            order.push(id);
            for observer in self.observers_of(id) {
                if let Some(count) = pending.get_mut(observer) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.push_back(*observer);
                    }
                }
            }
        }
        order
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn observers_of(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map_or(&[], Node::observers)
    }
}
