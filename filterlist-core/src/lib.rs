//! Filterlist Core
//!
//! This crate provides the orchestration engine for filterable, sortable,
//! paginated lists whose items come from an asynchronous loader.
//!
//! The engine owns the request parameters (intermediate and applied
//! filters, sorting, page, page size), keeps them in sync with a data store
//! such as a query string, and turns every change into a load whose result
//! commits only if no newer load started in the meantime.
//!
//! # Layout
//!
//! - [`filterlist`]: the engine and its builder
//! - [`store`]: where parameters live; [`store::QueryCodec`] for query strings
//! - [`overlay`] and [`persist`]: layers merged over the stored parameters
//! - [`lifecycle`]: request ids, debounce and the refresh timer
//! - [`reactive`] and [`graph`]: the value graph the parameters flow through
//!
//! # Example
//!
//! ```rust,no_run
//! use filterlist_core::{Filterlist, ItemsResponse, ListState, LoadAction, LoadFailure, RequestParams};
//! use futures_util::future::ready;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let list = Filterlist::<u32>::builder()
//!     .loader(|params: RequestParams, _: ListState<u32, (), ()>, _: LoadAction| {
//!         ready(Ok::<_, LoadFailure<(), ()>>(ItemsResponse::<u32, ()>::new(vec![params.page])))
//!     })
//!     .build()?;
//!
//! if let Some(load) = list.set_sorting("id", None) {
//!     load.await?;
//! }
//! assert!(!list.list_state().loading);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod filterlist;
pub mod graph;
pub mod lifecycle;
pub mod loader;
pub mod options;
pub mod overlay;
pub mod params;
pub mod persist;
pub mod reactive;
pub mod state;
pub mod store;

pub use error::{BoxError, ConfigError, FilterlistError, LoadFailure, LoadListError};
pub use events::{EventBus, EventType, ListenerId};
pub use filterlist::{Filterlist, FilterlistBuilder, Payload, ShouldRefresh, StateUpdate};
pub use loader::{ItemLoader, LoadHandle, LoadResult};
pub use options::{Options, PersistConfig};
pub use overlay::{OverlayStack, ParamsOverlay};
pub use params::{Filters, RequestParams, Sort};
pub use persist::{DurableStorage, MemoryStorage, PersistenceOverlay};
pub use state::{ItemsResponse, ListState, LoadAction};
pub use store::{ArrayFormat, DataStore, MemoryStore, QueryCodec, QueryKeys, StoreSubscription, StringStore};
