//! The item loader seam and the handle returned by load-triggering calls.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinHandle;

use crate::error::{FilterlistError, LoadFailure};
use crate::params::RequestParams;
use crate::state::{ItemsResponse, ListState, LoadAction};

/// Result of one loader call.
pub type LoadResult<I, A, E> = Result<ItemsResponse<I, A>, LoadFailure<A, E>>;

/// Fetches items for a set of request parameters.
///
/// Implemented for any `Fn(RequestParams, ListState, LoadAction) -> Future`.
pub trait ItemLoader<I, A, E>: Send + Sync + 'static {
    fn load(
        &self,
        params: RequestParams,
        prev: ListState<I, A, E>,
        action: LoadAction,
    ) -> BoxFuture<'static, LoadResult<I, A, E>>;
}

impl<I, A, E, F, Fut> ItemLoader<I, A, E> for F
where
    F: Fn(RequestParams, ListState<I, A, E>, LoadAction) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = LoadResult<I, A, E>> + Send + 'static,
{
    fn load(
        &self,
        params: RequestParams,
        prev: ListState<I, A, E>,
        action: LoadAction,
    ) -> BoxFuture<'static, LoadResult<I, A, E>> {
        self(params, prev, action).boxed()
    }
}

/// Handle to a dispatched request.
///
/// Awaiting it yields `Ok(())` once the request committed or was discarded
/// as stale, and the loader's defect otherwise. Dropping it detaches the
/// request; it still runs to completion.
#[derive(Debug)]
pub struct LoadHandle {
    task: JoinHandle<Result<(), FilterlistError>>,
}

impl LoadHandle {
    pub(crate) fn new(task: JoinHandle<Result<(), FilterlistError>>) -> Self {
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for LoadHandle {
    type Output = Result<(), FilterlistError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join)) => Poll::Ready(Err(FilterlistError::Join(join))),
            Poll::Pending => Poll::Pending,
        }
    }
}
