//! Periodic refresh of cache entries.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashboard_core::{DashError, RequestDescriptor, Result};
use tokio::sync::watch;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::query::{FetchFn, Inner};

/// Polling task shared by every subscription to one descriptor.
pub(crate) struct Poller {
    pub(crate) subscribers: usize,
    pub(crate) revision: watch::Sender<u64>,
    task: AbortHandle,
}

impl Poller {
    pub(crate) fn new(task: AbortHandle) -> Self {
        Self {
            subscribers: 1,
            revision: watch::Sender::new(0),
            task,
        }
    }

    /// Wakes subscribers after a new value was stored.
    pub(crate) fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub(crate) async fn poll_loop<V>(
    inner: Weak<Inner<V>>,
    descriptor: RequestDescriptor,
    fetcher: FetchFn<V>,
    ttl: Duration,
    period: Duration,
    runtime: Handle,
) where
    V: Clone + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(strong) = inner.upgrade() else {
            trace!(descriptor = %descriptor, "Cache dropped, polling stops");
            break;
        };
        let fetch = Inner::refresh(&strong, &runtime, &descriptor, &fetcher, ttl);
        drop(strong);

        if let Err(e) = fetch.await {
            warn!(descriptor = %descriptor, error = %e, "Polling refresh failed");
        }
    }
}

/// Keeps a cache entry refreshed while alive.
///
/// Returned by [`QueryCache::subscribe`](crate::QueryCache::subscribe).
/// Dropping the last subscription for a descriptor stops its polling task;
/// the cached value stays in place.
pub struct Subscription<V> {
    inner: Arc<Inner<V>>,
    descriptor: RequestDescriptor,
    revision: watch::Receiver<u64>,
}

impl<V> Subscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) const fn new(
        inner: Arc<Inner<V>>,
        descriptor: RequestDescriptor,
        revision: watch::Receiver<u64>,
    ) -> Self {
        Self {
            inner,
            descriptor,
            revision,
        }
    }

    /// The descriptor being polled.
    #[must_use]
    pub const fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// The value currently cached for the descriptor, fresh or not.
    #[must_use]
    pub fn latest(&self) -> Option<V> {
        self.inner
            .state
            .lock()
            .slots
            .get(&self.descriptor)
            .and_then(|slot| slot.value.clone())
    }

    /// Waits until a refresh stores a new value.
    pub async fn changed(&mut self) -> Result<()> {
        self.revision
            .changed()
            .await
            .map_err(|_| DashError::Other(format!("polling stopped for {}", self.descriptor)))
    }
}

impl<V> fmt::Debug for Subscription<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("descriptor", &self.descriptor)
            .field("revision", &*self.revision.borrow())
            .finish()
    }
}

impl<V> Drop for Subscription<V> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        let last = match state.pollers.get_mut(&self.descriptor) {
            Some(poller) => {
                poller.subscribers = poller.subscribers.saturating_sub(1);
                poller.subscribers == 0
            }
            None => false,
        };
        if last {
            state.pollers.remove(&self.descriptor);
            debug!(descriptor = %self.descriptor, "Last subscriber gone, polling stopped");
        }
    }
}
