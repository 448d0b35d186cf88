//! Cache entry bookkeeping.

use chrono::{DateTime, TimeDelta, Utc};
use dashboard_core::Result;
use futures::future::{BoxFuture, Shared};
use std::time::Duration;

/// Lifecycle state of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Within its freshness window; served without a fetch.
    Fresh,
    /// Past its freshness window or invalidated; the next read refetches.
    Stale,
    /// A fetch is in flight; readers join it.
    Fetching,
    /// The last fetch failed; the next read retries.
    Invalid,
}

impl EntryState {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Fetching => "fetching",
            Self::Invalid => "invalid",
        }
    }
}

/// Output of a fetch as seen by the readers waiting on it.
#[derive(Debug, Clone)]
pub(crate) struct Fetched<V> {
    pub(crate) value: V,
    /// Set when the fetch failed and the last known value stood in for it.
    pub(crate) stale: bool,
}

pub(crate) type SharedFetch<V> = Shared<BoxFuture<'static, Result<Fetched<V>>>>;

pub(crate) struct InFlight<V> {
    pub(crate) id: u64,
    pub(crate) shared: SharedFetch<V>,
}

/// One descriptor's cached value and fetch bookkeeping.
pub(crate) struct Slot<V> {
    pub(crate) value: Option<V>,
    pub(crate) fetched_at: Option<DateTime<Utc>>,
    pub(crate) stale_after: Duration,
    /// Bumped on every invalidation; a fetch issued under an older epoch
    /// still stores its value but cannot make the entry fresh.
    pub(crate) epoch: u64,
    pub(crate) invalidated: bool,
    pub(crate) failed: bool,
    pub(crate) in_flight: Option<InFlight<V>>,
}

impl<V> Slot<V> {
    pub(crate) const fn new(stale_after: Duration, epoch: u64) -> Self {
        Self {
            value: None,
            fetched_at: None,
            stale_after,
            epoch,
            invalidated: false,
            failed: false,
            in_flight: None,
        }
    }

    fn within_ttl(&self, now: DateTime<Utc>) -> bool {
        let Some(fetched_at) = self.fetched_at else {
            return false;
        };
        let age = now.signed_duration_since(fetched_at);
        age < TimeDelta::from_std(self.stale_after).unwrap_or(TimeDelta::MAX)
    }

    pub(crate) fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == EntryState::Fresh
    }

    pub(crate) fn state(&self, now: DateTime<Utc>) -> EntryState {
        if self.in_flight.is_some() {
            EntryState::Fetching
        } else if self.failed {
            EntryState::Invalid
        } else if self.invalidated || self.value.is_none() || !self.within_ttl(now) {
            EntryState::Stale
        } else {
            EntryState::Fresh
        }
    }

    pub(crate) fn state_name(&self, now: DateTime<Utc>) -> &'static str {
        self.state(now).as_str()
    }

    /// Marks the entry stale under a new epoch and detaches any in-flight
    /// fetch so the next read issues its own.
    pub(crate) fn invalidate(&mut self, epoch: u64) {
        self.invalidated = true;
        self.epoch = epoch;
        self.in_flight = None;
    }
}
