//! Reactive Primitives
//!
//! This module implements the reactive value graph: signals, memos, and
//! effects. The engine keeps its request parameters in this graph so that
//! writes from the engine itself and changes made outside it (for example a
//! navigation that rewrites the query string) flow through one path.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a mutable cell. Reading it inside a memo or effect registers
//! that computation as a dependent; writing it invalidates every dependent.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result and recomputes lazily,
//! on the first read after an upstream change.
//!
//! ## Effects
//!
//! An Effect re-runs whenever a cell it read on its last run is written.
//! The engine uses one to react to request parameter changes and stores use
//! them to drive their listeners.
//!
//! ## Batches
//!
//! Effects run at batch boundaries. Several writes inside one [`batch`]
//! produce a single pass over the affected effects.
//!
//! # Implementation Notes
//!
//! Dependency tracking uses a thread-local context stack; edges live in a
//! global [`crate::graph::DependencyGraph`] guarded by a lock that is never
//! held while user code runs.

mod batch;
mod context;
mod effect;
mod memo;
mod runtime;
mod signal;

pub use batch::{batch, is_batching};
pub use context::{untrack, ReactiveContext};
pub use effect::{Cleanup, Effect};
pub use memo::{Memo, MemoState};
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use signal::Signal;
