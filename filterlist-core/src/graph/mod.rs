//! Dependency graph behind the reactive runtime.
//!
//! Nodes are signals, memos and effects. An edge runs from a cell to each
//! cell that read it during its last run, so a write can find every cell it
//! invalidates without asking the cells themselves.

mod node;
mod scheduler;

pub use node::{Node, NodeId, NodeKind};
pub use scheduler::DependencyGraph;
