//! Read-through query cache.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::TimeDelta;
use dashboard_core::{Clock, DashError, RequestDescriptor, Result, SystemClock};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, instrument, warn};

use crate::entry::{EntryState, Fetched, InFlight, SharedFetch, Slot};
use crate::subscription::{Poller, Subscription, poll_loop};

/// What to hand readers when a refetch fails but an older value exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Surface the failure to every waiter.
    #[default]
    Propagate,
    /// Return the last known value, flagged as [`Lookup::StaleDataServed`].
    ///
    /// The entry is still marked [`EntryState::Invalid`] so the next read
    /// retries. Entries that never fetched successfully surface the failure.
    ServeStale,
}

/// How a value returned by [`QueryCache::get_detailed`] was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// Served from a fresh entry without a fetch.
    Hit,
    /// This call issued the fetch.
    Fetched,
    /// This call joined a fetch another reader had already issued.
    Joined,
    /// The fetch failed and the last known value was served instead.
    StaleDataServed,
}

/// A value read through the cache together with how it was obtained.
#[derive(Clone, Debug, PartialEq)]
pub struct Cached<V> {
    /// The value.
    pub value: V,
    /// How the value was obtained.
    pub lookup: Lookup,
}

pub(crate) type FetchFn<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V>> + Send + Sync>;

pub(crate) struct State<V> {
    pub(crate) slots: HashMap<RequestDescriptor, Slot<V>>,
    pub(crate) pollers: HashMap<RequestDescriptor, Poller>,
}

pub(crate) struct Inner<V> {
    pub(crate) state: Mutex<State<V>>,
    clock: Arc<dyn Clock>,
    policy: FailurePolicy,
    next_id: AtomicU64,
}

/// Keyed, in-memory cache of backend query results.
///
/// Each entry remembers when it was fetched and how long it stays fresh.
/// Reads of a fresh entry never touch the network; reads of a stale, invalid
/// or missing entry issue exactly one fetch no matter how many readers arrive
/// while it is in flight. Fetches run as spawned tasks, so a reader that goes
/// away does not cancel the fetch and the result still lands in the cache.
///
/// Cloning is cheap and every clone shares the same entries.
pub struct QueryCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for QueryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("QueryCache")
            .field("entries", &state.slots.len())
            .field("polling", &state.pollers.len())
            .field("policy", &self.inner.policy)
            .field("clock", &self.inner.clock)
            .finish()
    }
}

impl<V> Default for QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty cache reading freshness from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    slots: HashMap::new(),
                    pollers: HashMap::new(),
                }),
                clock,
                policy: FailurePolicy::default(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Sets the failure policy.
    ///
    /// Must be called before the cache is cloned or shared.
    #[must_use]
    pub fn with_failure_policy(self, policy: FailurePolicy) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.policy = policy;
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                warn!("Failure policy ignored on a shared cache");
                Self { inner }
            }
        }
    }

    /// Returns the configured failure policy.
    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.inner.policy
    }

    /// Reads `descriptor` through the cache.
    ///
    /// `fetcher` is only called when the entry is not fresh and no fetch is
    /// already in flight; it should build its future without doing work
    /// itself. `ttl` becomes the entry's freshness window. Outside a Tokio
    /// runtime every read fails with [`DashError::Other`].
    pub async fn get<F, Fut>(
        &self,
        descriptor: &RequestDescriptor,
        fetcher: F,
        ttl: Duration,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.get_detailed(descriptor, fetcher, ttl)
            .await
            .map(|cached| cached.value)
    }

    /// Like [`get`](Self::get), but also reports how the value was obtained.
    #[instrument(skip_all, fields(descriptor = %descriptor))]
    pub async fn get_detailed<F, Fut>(
        &self,
        descriptor: &RequestDescriptor,
        fetcher: F,
        ttl: Duration,
    ) -> Result<Cached<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|e| DashError::Other(format!("fetching needs a Tokio runtime: {e}")))?;
        let (shared, lookup) = {
            let fetcher = fetcher;
            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now();
            let slot = state
                .slots
                .entry(descriptor.clone())
                .or_insert_with(|| Slot::new(ttl, self.inner.next_id()));
            slot.stale_after = ttl;

            if slot.is_fresh(now) {
                if let Some(value) = &slot.value {
                    debug!("Cache hit");
                    return Ok(Cached {
                        value: value.clone(),
                        lookup: Lookup::Hit,
                    });
                }
            }

            match slot.in_flight.as_ref().map(|f| f.shared.clone()) {
                Some(shared) => {
                    debug!("Joining in-flight fetch");
                    (shared, Lookup::Joined)
                }
                None => {
                    debug!(state = slot.state_name(now), "Cache miss, fetching");
                    let fetch = fetcher().boxed();
                    (
                        Inner::start_fetch(&self.inner, &runtime, descriptor, slot, fetch),
                        Lookup::Fetched,
                    )
                }
            }
        };

        let fetched = shared.await?;
        Ok(Cached {
            value: fetched.value,
            lookup: if fetched.stale {
                Lookup::StaleDataServed
            } else {
                lookup
            },
        })
    }

    /// Marks every entry whose descriptor starts with `prefix` as stale.
    ///
    /// Entries are kept. A fetch already in flight still completes and stores
    /// its value, but the next read issues a new fetch instead of joining it.
    /// Returns the number of entries invalidated.
    #[instrument(skip_all, fields(prefix = %prefix))]
    pub fn invalidate(&self, prefix: &RequestDescriptor) -> usize {
        self.invalidate_where(|descriptor| descriptor.starts_with(prefix))
    }

    /// Marks the entry for exactly `descriptor` as stale.
    ///
    /// Returns true if the entry existed.
    #[instrument(skip_all, fields(descriptor = %descriptor))]
    pub fn invalidate_exact(&self, descriptor: &RequestDescriptor) -> bool {
        self.invalidate_where(|d| d == descriptor) > 0
    }

    fn invalidate_where(&self, matches: impl Fn(&RequestDescriptor) -> bool) -> usize {
        let mut state = self.inner.state.lock();
        let mut count = 0usize;
        for (descriptor, slot) in &mut state.slots {
            if matches(descriptor) {
                slot.invalidate(self.inner.next_id());
                count += 1;
            }
        }
        if count > 0 {
            debug!("Invalidated {} cache entries", count);
        }
        count
    }

    /// Deletes every entry whose descriptor starts with `prefix`.
    ///
    /// Polling subscriptions are unaffected and repopulate their entries on
    /// their next tick. Returns the number of entries removed.
    #[instrument(skip_all, fields(prefix = %prefix))]
    pub fn remove(&self, prefix: &RequestDescriptor) -> usize {
        let mut state = self.inner.state.lock();
        let before = state.slots.len();
        state.slots.retain(|descriptor, _| !descriptor.starts_with(prefix));
        let removed = before - state.slots.len();
        if removed > 0 {
            debug!("Removed {} cache entries", removed);
        }
        removed
    }

    /// Deletes every entry.
    #[instrument(skip(self))]
    pub fn clear(&self) {
        self.inner.state.lock().slots.clear();
        debug!("Cleared all cache entries");
    }

    /// Deletes entries last fetched `older_than` ago or earlier.
    ///
    /// Entries with a fetch in flight or a polling subscription are kept;
    /// entries that never stored a value count as expired. Descriptors that
    /// embed a date range accumulate as the range moves, so long-running
    /// callers sweep periodically. Returns the number of entries removed.
    #[instrument(skip(self))]
    pub fn remove_expired(&self, older_than: Duration) -> usize {
        let now = self.inner.clock.now();
        let max_age = TimeDelta::from_std(older_than).unwrap_or(TimeDelta::MAX);
        let mut state = self.inner.state.lock();
        let State { slots, pollers } = &mut *state;

        let before = slots.len();
        slots.retain(|descriptor, slot| {
            slot.in_flight.is_some()
                || pollers.contains_key(descriptor)
                || slot
                    .fetched_at
                    .is_some_and(|at| now.signed_duration_since(at) < max_age)
        });
        let removed = before - slots.len();
        if removed > 0 {
            debug!("Removed {} expired cache entries", removed);
        }
        removed
    }

    /// Returns the stored value regardless of freshness, without fetching.
    #[must_use]
    pub fn peek(&self, descriptor: &RequestDescriptor) -> Option<V> {
        self.inner
            .state
            .lock()
            .slots
            .get(descriptor)
            .and_then(|slot| slot.value.clone())
    }

    /// Returns the lifecycle state of the entry, if it exists.
    #[must_use]
    pub fn state(&self, descriptor: &RequestDescriptor) -> Option<EntryState> {
        let now = self.inner.clock.now();
        self.inner
            .state
            .lock()
            .slots
            .get(descriptor)
            .map(|slot| slot.state(now))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if a polling task is running for `descriptor`.
    #[must_use]
    pub fn is_polling(&self, descriptor: &RequestDescriptor) -> bool {
        self.inner.state.lock().pollers.contains_key(descriptor)
    }

    /// Keeps `descriptor` refreshed every `interval` while the returned
    /// subscription is alive.
    ///
    /// The first refresh runs immediately. Subscriptions to the same
    /// descriptor share one polling task, which keeps the interval and
    /// fetcher of the first subscriber and stops when the last subscription
    /// is dropped. Must be called from within a Tokio runtime.
    #[instrument(skip_all, fields(descriptor = %descriptor))]
    pub fn subscribe<F, Fut>(
        &self,
        descriptor: RequestDescriptor,
        fetcher: F,
        ttl: Duration,
        interval: Duration,
    ) -> Result<Subscription<V>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(DashError::InvalidParameter(
                "polling interval must be positive".to_string(),
            ));
        }
        let runtime = Handle::try_current()
            .map_err(|e| DashError::Other(format!("polling needs a Tokio runtime: {e}")))?;

        let mut state = self.inner.state.lock();
        let revision = match state.pollers.get_mut(&descriptor) {
            Some(poller) => {
                poller.subscribers += 1;
                debug!(subscribers = poller.subscribers, "Joined existing poll");
                poller.revision.subscribe()
            }
            None => {
                let fetcher: FetchFn<V> = Arc::new(move || fetcher().boxed());
                let task = runtime.spawn(poll_loop(
                    Arc::downgrade(&self.inner),
                    descriptor.clone(),
                    fetcher,
                    ttl,
                    interval,
                    runtime.clone(),
                ));
                let poller = Poller::new(task.abort_handle());
                let revision = poller.revision.subscribe();
                state.pollers.insert(descriptor.clone(), poller);
                debug!(interval_ms = interval.as_millis() as u64, "Started polling");
                revision
            }
        };
        drop(state);

        Ok(Subscription::new(Arc::clone(&self.inner), descriptor, revision))
    }
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Forces a fetch for `descriptor`, joining one already in flight.
    pub(crate) fn refresh(
        this: &Arc<Self>,
        runtime: &Handle,
        descriptor: &RequestDescriptor,
        fetcher: &FetchFn<V>,
        ttl: Duration,
    ) -> SharedFetch<V> {
        let mut state = this.state.lock();
        let slot = state
            .slots
            .entry(descriptor.clone())
            .or_insert_with(|| Slot::new(ttl, this.next_id()));
        slot.stale_after = ttl;
        match slot.in_flight.as_ref().map(|f| f.shared.clone()) {
            Some(shared) => shared,
            None => Self::start_fetch(this, runtime, descriptor, slot, fetcher()),
        }
    }

    /// Spawns `fetch` and records it as the entry's in-flight fetch.
    ///
    /// The caller holds the state lock, so the spawned task cannot store its
    /// result before the in-flight marker is in place.
    fn start_fetch(
        this: &Arc<Self>,
        runtime: &Handle,
        descriptor: &RequestDescriptor,
        slot: &mut Slot<V>,
        fetch: BoxFuture<'static, Result<V>>,
    ) -> SharedFetch<V> {
        let id = this.next_id();
        let epoch = slot.epoch;
        let weak: Weak<Self> = Arc::downgrade(this);
        let key = descriptor.clone();

        let task = runtime.spawn(async move {
            let result = fetch.await;
            match weak.upgrade() {
                Some(inner) => inner.complete(&key, id, epoch, result),
                None => result.map(|value| Fetched {
                    value,
                    stale: false,
                }),
            }
        });

        let shared = async move {
            task.await
                .unwrap_or_else(|e| Err(DashError::Other(format!("fetch task failed: {e}"))))
        }
        .boxed()
        .shared();

        slot.in_flight = Some(InFlight {
            id,
            shared: shared.clone(),
        });
        shared
    }

    /// Stores the outcome of fetch `id`; the last fetch to resolve wins.
    fn complete(
        &self,
        descriptor: &RequestDescriptor,
        id: u64,
        epoch: u64,
        result: Result<V>,
    ) -> Result<Fetched<V>> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        let State { slots, pollers } = &mut *state;

        let Some(slot) = slots.get_mut(descriptor) else {
            debug!(descriptor = %descriptor, "Entry removed during fetch, dropping result");
            return result.map(|value| Fetched {
                value,
                stale: false,
            });
        };

        if slot.in_flight.as_ref().is_some_and(|f| f.id == id) {
            slot.in_flight = None;
        }

        match result {
            Ok(value) => {
                slot.value = Some(value.clone());
                slot.fetched_at = Some(now);
                slot.failed = false;
                slot.invalidated = slot.epoch != epoch;
                if let Some(poller) = pollers.get(descriptor) {
                    poller.notify();
                }
                debug!(
                    descriptor = %descriptor,
                    superseded = slot.invalidated,
                    "Stored fetch result"
                );
                Ok(Fetched {
                    value,
                    stale: false,
                })
            }
            Err(e) => {
                slot.failed = true;
                match (self.policy, &slot.value) {
                    (FailurePolicy::ServeStale, Some(last)) => {
                        warn!(
                            descriptor = %descriptor,
                            error = %e,
                            "Fetch failed, serving last known value"
                        );
                        Ok(Fetched {
                            value: last.clone(),
                            stale: true,
                        })
                    }
                    _ => {
                        warn!(descriptor = %descriptor, error = %e, "Fetch failed");
                        Err(e)
                    }
                }
            }
        }
    }
}
