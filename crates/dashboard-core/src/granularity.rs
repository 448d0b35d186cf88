//! Bucket granularity definitions.
//!
//! This module defines [`Granularity`], the width of the buckets a timeseries is
//! grouped into, and the span-length policy that picks one for a date range.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Longest span still bucketed hourly.
pub const HOURLY_MAX_SPAN: TimeDelta = TimeDelta::days(2);

/// Longest span still bucketed daily.
pub const DAILY_MAX_SPAN: TimeDelta = TimeDelta::days(14);

/// Width of a timeseries bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    /// One-hour buckets.
    Hour,
    /// One-day buckets.
    Day,
    /// One-week buckets, starting on the configured week start.
    Week,
}

impl Granularity {
    /// Picks the granularity for a range of the given span.
    ///
    /// Spans up to two days are hourly, up to fourteen days daily, and
    /// anything longer weekly. Both bounds are inclusive.
    #[must_use]
    pub fn for_span(span: TimeDelta) -> Self {
        if span <= HOURLY_MAX_SPAN {
            Self::Hour
        } else if span <= DAILY_MAX_SPAN {
            Self::Day
        } else {
            Self::Week
        }
    }

    /// Nominal length of one bucket.
    ///
    /// Calendar buckets crossing a DST transition are an hour longer or
    /// shorter in absolute time.
    #[must_use]
    pub const fn nominal(&self) -> TimeDelta {
        match self {
            Self::Hour => TimeDelta::hours(1),
            Self::Day => TimeDelta::days(1),
            Self::Week => TimeDelta::weeks(1),
        }
    }

    /// Short label used in request descriptors and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
