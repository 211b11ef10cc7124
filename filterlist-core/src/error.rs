//! Error types.
//!
//! Loaders report expected failures with [`LoadListError`]; those end up in
//! `ListState::error`. Anything else a loader returns is a defect and comes
//! back to the caller as [`FilterlistError::Loader`].

use thiserror::Error;

/// Boxed error for loader defects.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum FilterlistError {
    /// The loader failed with something other than a [`LoadListError`].
    #[error("item loader failed: {0}")]
    Loader(#[source] BoxError),

    /// The load task panicked or was aborted by the runtime.
    #[error("load task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Local item edit addressed a position outside the list.
    #[error("item index {index} out of range for list of {len} items")]
    ItemIndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Construction-time misuse.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no item loader configured")]
    MissingLoader,

    #[error("no tokio runtime available; build inside a runtime or pass a handle")]
    MissingRuntime,

    #[error("invalid options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
}

/// Expected load failure, recovered into the list state.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadListError<A, E> {
    pub error: Option<E>,
    /// Replaces `ListState::additional` when present.
    pub additional: Option<A>,
    /// Replaces `ListState::total` when present.
    pub total: Option<u64>,
}

impl<A, E> Default for LoadListError<A, E> {
    fn default() -> Self {
        Self {
            error: None,
            additional: None,
            total: None,
        }
    }
}

impl<A, E> LoadListError<A, E> {
    pub fn new(error: E) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_additional(mut self, additional: A) -> Self {
        self.additional = Some(additional);
        self
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }
}

/// Failure returned by an item loader.
#[derive(Debug)]
pub enum LoadFailure<A, E> {
    /// Expected failure, shown to the user through `ListState::error`.
    List(LoadListError<A, E>),
    /// Programming or infrastructure error, propagated to the caller.
    Defect(BoxError),
}

impl<A, E> LoadFailure<A, E> {
    /// Wrap any error as a defect.
    pub fn defect(error: impl Into<BoxError>) -> Self {
        Self::Defect(error.into())
    }
}

impl<A, E> From<LoadListError<A, E>> for LoadFailure<A, E> {
    fn from(error: LoadListError<A, E>) -> Self {
        Self::List(error)
    }
}
