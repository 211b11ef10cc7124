//! Graph Nodes

use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

/// Identity of one reactive cell.
///
/// Ids are handed out from a process-wide counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Signal: written from outside, read by others.
    Source,
    /// Memo: reads others and is read in turn.
    Derived,
    /// Effect: reads others, nobody reads it.
    Effect,
}

/// Adjacent node ids. A list engine rarely has more than a few per node.
pub(crate) type Links = SmallVec<[NodeId; 4]>;

/// Adjacency of one cell: what it read on its last run and who read it.
#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    sources: Links,
    observers: Links,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            sources: Links::new(),
            observers: Links::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Cells this node read on its last run.
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    /// Cells that read this node.
    pub fn observers(&self) -> &[NodeId] {
        &self.observers
    }

    /// Returns `false` if `source` was already linked.
    pub(crate) fn link_source(&mut self, source: NodeId) -> bool {
        push_once(&mut self.sources, source)
    }

    pub(crate) fn link_observer(&mut self, observer: NodeId) -> bool {
        push_once(&mut self.observers, observer)
    }

    pub(crate) fn unlink_source(&mut self, source: NodeId) {
        self.sources.retain(|id| *id != source);
    }

    pub(crate) fn unlink_observer(&mut self, observer: NodeId) {
        self.observers.retain(|id| *id != observer);
    }

    pub(crate) fn drain_sources(&mut self) -> Links {
        std::mem::take(&mut self.sources)
    }
}

fn push_once(links: &mut Links, id: NodeId) -> bool {
    let fresh = !links.contains(&id);
    if fresh {
        links.push(id);
    }
    fresh
}
