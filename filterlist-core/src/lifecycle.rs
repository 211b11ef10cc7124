//! Request lifecycle: request ids, debounce and the auto-refresh timer.
//!
//! Every dispatch takes the next id. A settlement commits only while its id
//! is still the latest one; anything older is discarded. In-flight loader
//! calls are never aborted, their results are simply ignored.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// Monotonic request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Owns the request counter and the timers of one engine.
#[derive(Debug)]
pub struct RequestTracker {
    counter: AtomicU64,
    debounce: Option<Duration>,
    refresh_interval: Option<Duration>,
    refresh_timer: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

impl RequestTracker {
    pub fn new(runtime: Handle, debounce: Option<Duration>, refresh_interval: Option<Duration>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            debounce: debounce.filter(|d| !d.is_zero()),
            refresh_interval: refresh_interval.filter(|d| !d.is_zero()),
            refresh_timer: Mutex::new(None),
            runtime,
        }
    }

    /// Start a new request: take the next id and cancel the refresh timer.
    pub fn begin(&self) -> RequestId {
        self.cancel_refresh();
        RequestId(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The id of the latest request.
    pub fn current(&self) -> RequestId {
        RequestId(self.counter.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, id: RequestId) -> bool {
        self.current() == id
    }

    /// Invalidate every outstanding request without starting a new one.
    pub fn invalidate(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Wait out the debounce delay.
    ///
    /// Returns whether `id` is still the latest request afterwards. Without
    /// a delay every request goes through to the loader.
    pub async fn debounce(&self, id: RequestId) -> bool {
        let Some(delay) = self.debounce else {
            return true;
        };
        tokio::time::sleep(delay).await;
        let current = self.is_current(id);
        if !current {
            trace!(request_id = id.raw(), "superseded during debounce");
        }
        current
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }

    /// Arm the refresh timer, if an interval is configured.
    ///
    /// On each tick `should_refresh` decides: `true` fires `refresh` and
    /// stops the timer, `false` waits another interval.
    pub fn schedule_refresh<P, R>(&self, should_refresh: P, refresh: R)
    where
        P: Fn() -> bool + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        let Some(interval) = self.refresh_interval else {
            return;
        };

        let task = self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if should_refresh() {
                    break;
                }
                trace!("refresh declined, rescheduling");
            }
            refresh();
        });

        if let Some(previous) = self.refresh_timer.lock().replace(task) {
            previous.abort();
        }
    }

    /// Forget the refresh timer without aborting it.
    ///
    /// Called from the timer task itself right before it dispatches.
    pub fn detach_refresh(&self) {
        self.refresh_timer.lock().take();
    }

    pub fn cancel_refresh(&self) {
        if let Some(timer) = self.refresh_timer.lock().take() {
            timer.abort();
        }
    }

    pub fn has_refresh_timer(&self) -> bool {
        self.refresh_timer.lock().is_some()
    }

    /// Stop everything: invalidate in-flight requests and cancel timers.
    pub fn destroy(&self) {
        self.invalidate();
        self.cancel_refresh();
    }
}
