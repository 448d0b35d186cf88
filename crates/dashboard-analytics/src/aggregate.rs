//! Time-bucketed aggregation.
//!
//! [`aggregate`] groups [`TimeseriesPoint`]s into hour, day or week buckets.
//! The granularity comes from the span of the selected range
//! ([`Granularity::for_span`]) and bucket boundaries are computed on the
//! viewer's wall clock, so two points in the same local hour, day or week
//! share a bucket even when a DST transition falls between them.
//!
//! The range only chooses the granularity and, with zero-filling, the extent
//! of empty buckets. Points outside it are kept in their own buckets; callers
//! filter beforehand when they want them dropped.

use std::collections::BTreeMap;

use chrono::{
    DateTime, Datelike, Local, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike, Utc,
    Weekday,
};
use dashboard_core::{Bucket, DateRange, Granularity, TimeseriesPoint};
use tracing::trace;

/// Knobs for [`aggregate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Emit empty buckets for every interval of the range.
    pub zero_fill: bool,
    /// First day of a weekly bucket.
    pub week_start: Weekday,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            zero_fill: false,
            week_start: Weekday::Mon,
        }
    }
}

impl AggregateOptions {
    /// Sparse buckets, weeks starting Monday.
    #[must_use]
    pub fn sparse() -> Self {
        Self::default()
    }

    /// Every bucket of the range, weeks starting Monday.
    #[must_use]
    pub fn zero_filled() -> Self {
        Self {
            zero_fill: true,
            ..Self::default()
        }
    }

    /// Sets the first day of weekly buckets.
    #[must_use]
    pub const fn with_week_start(mut self, week_start: Weekday) -> Self {
        self.week_start = week_start;
        self
    }
}

/// Floors a wall-clock time to the start of its bucket.
#[must_use]
pub fn floor_local(
    local: NaiveDateTime,
    granularity: Granularity,
    week_start: Weekday,
) -> NaiveDateTime {
    let midnight = local.date().and_time(NaiveTime::MIN);
    match granularity {
        Granularity::Hour => midnight + TimeDelta::hours(i64::from(local.hour())),
        Granularity::Day => midnight,
        Granularity::Week => {
            let back = (local.weekday().num_days_from_monday() + 7
                - week_start.num_days_from_monday())
                % 7;
            midnight - TimeDelta::days(i64::from(back))
        }
    }
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// Maps a bucket's wall-clock start to an instant.
///
/// Repeated wall-clock times resolve to their earliest instant. A start that
/// falls inside a DST gap resolves to the end of the gap.
fn bucket_instant<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    resolve_local(tz, local)
        .or_else(|| resolve_local(tz, local + TimeDelta::hours(1)))
        .unwrap_or_else(|| local.and_utc())
}

/// Groups `points` into buckets sized by the span of `range`.
///
/// Buckets are sorted ascending by start. `reducer` is called exactly once
/// per bucket with the bucket's full point set (an empty slice for
/// zero-filled buckets).
pub fn aggregate<Tz, T, R>(
    points: &[TimeseriesPoint],
    range: &DateRange,
    tz: &Tz,
    reducer: R,
    options: AggregateOptions,
) -> Vec<Bucket<T>>
where
    Tz: TimeZone,
    R: Fn(&[TimeseriesPoint]) -> T,
{
    let granularity = Granularity::for_span(range.span());
    aggregate_with(points, range, tz, granularity, reducer, options)
}

/// [`aggregate`] in the process's local timezone.
pub fn aggregate_local<T, R>(
    points: &[TimeseriesPoint],
    range: &DateRange,
    reducer: R,
    options: AggregateOptions,
) -> Vec<Bucket<T>>
where
    R: Fn(&[TimeseriesPoint]) -> T,
{
    aggregate(points, range, &Local, reducer, options)
}

/// [`aggregate`] with an explicit granularity instead of the span policy.
pub fn aggregate_with<Tz, T, R>(
    points: &[TimeseriesPoint],
    range: &DateRange,
    tz: &Tz,
    granularity: Granularity,
    reducer: R,
    options: AggregateOptions,
) -> Vec<Bucket<T>>
where
    Tz: TimeZone,
    R: Fn(&[TimeseriesPoint]) -> T,
{
    let mut groups: BTreeMap<NaiveDateTime, Vec<TimeseriesPoint>> = BTreeMap::new();

    for point in points {
        let local = point.timestamp.with_timezone(tz).naive_local();
        groups
            .entry(floor_local(local, granularity, options.week_start))
            .or_default()
            .push(point.clone());
    }

    if options.zero_fill {
        let end = range.to.with_timezone(tz).naive_local();
        let mut cursor = floor_local(
            range.from.with_timezone(tz).naive_local(),
            granularity,
            options.week_start,
        );
        while cursor < end {
            // An hour skipped by a DST gap has no instants and no bucket.
            if granularity != Granularity::Hour || resolve_local(tz, cursor).is_some() {
                groups.entry(cursor).or_default();
            }
            cursor += granularity.nominal();
        }
    }

    trace!(
        granularity = %granularity,
        points = points.len(),
        buckets = groups.len(),
        "Aggregated timeseries"
    );

    groups
        .into_iter()
        .map(|(local_start, points)| Bucket {
            start: bucket_instant(tz, local_start),
            local_start,
            aggregate: reducer(&points),
            points,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::count;
    use chrono::{FixedOffset, LocalResult, NaiveDate};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn point(s: &str) -> TimeseriesPoint {
        TimeseriesPoint::new(utc(s))
    }

    fn range(from: &str, to: &str) -> DateRange {
        DateRange::new(utc(from), utc(to)).unwrap()
    }

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    /// US Eastern rules for 2024 only: EDT from 2024-03-10 02:00 local to
    /// 2024-11-03 02:00 local, EST otherwise.
    #[derive(Clone, Copy, Debug)]
    struct Eastern2024;

    impl Eastern2024 {
        fn est() -> FixedOffset {
            FixedOffset::west_opt(5 * 3600).unwrap()
        }

        fn edt() -> FixedOffset {
            FixedOffset::west_opt(4 * 3600).unwrap()
        }
    }

    impl TimeZone for Eastern2024 {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            Self
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(12, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let gap_start = naive("2024-03-10T02:00:00");
            let gap_end = naive("2024-03-10T03:00:00");
            let fold_start = naive("2024-11-03T01:00:00");
            let fold_end = naive("2024-11-03T02:00:00");
            if *local >= gap_start && *local < gap_end {
                LocalResult::None
            } else if *local >= fold_start && *local < fold_end {
                LocalResult::Ambiguous(Self::edt(), Self::est())
            } else if *local >= gap_end && *local < fold_start {
                LocalResult::Single(Self::edt())
            } else {
                LocalResult::Single(Self::est())
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc >= naive("2024-03-10T07:00:00") && *utc < naive("2024-11-03T06:00:00") {
                Self::edt()
            } else {
                Self::est()
            }
        }
    }

    #[test]
    fn test_one_day_span_is_hourly() {
        let points = vec![point("2024-01-01T10:15:00Z"), point("2024-01-01T10:59:59Z")];
        let buckets = aggregate(
            &points,
            &range("2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z"),
            &Utc,
            count,
            AggregateOptions::sparse(),
        );
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].start, utc("2024-01-01T10:00:00Z"));
        assert_eq!(buckets[0].aggregate, 2);
    }

    #[test]
    fn test_every_point_in_exactly_one_bucket() {
        let stamps = [
            "2024-05-01T00:00:00Z",
            "2024-05-01T00:59:59Z",
            "2024-05-01T07:30:00Z",
            "2024-05-03T23:10:00Z",
            "2024-05-09T12:00:00Z",
            "2024-04-28T05:00:00Z",
        ];
        let points: Vec<_> = stamps.iter().map(|s| point(s)).collect();

        for r in [
            range("2024-05-01T00:00:00Z", "2024-05-02T00:00:00Z"),
            range("2024-05-01T00:00:00Z", "2024-05-10T00:00:00Z"),
            range("2024-04-01T00:00:00Z", "2024-06-01T00:00:00Z"),
        ] {
            let buckets = aggregate(&points, &r, &Utc, count, AggregateOptions::sparse());
            let total: usize = buckets.iter().map(|b| b.points.len()).sum();
            assert_eq!(total, points.len());

            let granularity = Granularity::for_span(r.span());
            for bucket in &buckets {
                assert_eq!(bucket.aggregate, bucket.points.len());
                for p in &bucket.points {
                    assert!(p.timestamp >= bucket.start);
                    assert!(p.timestamp < bucket.start + granularity.nominal());
                }
            }
            assert!(buckets.windows(2).all(|w| w[0].start < w[1].start));
        }
    }

    #[test]
    fn test_granularity_switch_boundary() {
        let from = utc("2024-03-04T00:00:00Z");
        let p = vec![point("2024-03-05T13:45:00Z")];
        let cases = [
            (TimeDelta::days(2), "2024-03-05T13:00:00Z"),
            (TimeDelta::days(2) + TimeDelta::seconds(1), "2024-03-05T00:00:00Z"),
            (TimeDelta::days(14), "2024-03-05T00:00:00Z"),
            (TimeDelta::days(14) + TimeDelta::seconds(1), "2024-03-04T00:00:00Z"),
        ];
        for (span, expected) in cases {
            let r = DateRange::new(from, from + span).unwrap();
            let buckets = aggregate(&p, &r, &Utc, count, AggregateOptions::sparse());
            assert_eq!(buckets[0].start, utc(expected), "span {span}");
        }
    }

    #[test]
    fn test_call_log_scenario() {
        let points = vec![
            point("2024-03-01T09:00:00Z"),
            point("2024-03-01T09:45:00Z"),
            point("2024-03-02T14:00:00Z"),
        ];
        let buckets = aggregate(
            &points,
            &range("2024-03-01T00:00:00Z", "2024-03-02T00:00:00Z"),
            &Utc,
            count,
            AggregateOptions::sparse(),
        );
        let summary: Vec<_> = buckets.iter().map(|b| (b.start, b.aggregate)).collect();
        assert_eq!(
            summary,
            vec![
                (utc("2024-03-01T09:00:00Z"), 2),
                (utc("2024-03-02T14:00:00Z"), 1),
            ]
        );
    }

    #[test]
    fn test_zero_fill_covers_range() {
        let points = vec![point("2024-03-01T09:10:00Z")];
        let buckets = aggregate(
            &points,
            &range("2024-03-01T06:00:00Z", "2024-03-01T12:00:00Z"),
            &Utc,
            count,
            AggregateOptions::zero_filled(),
        );
        assert_eq!(buckets.len(), 6);
        assert_eq!(buckets[0].start, utc("2024-03-01T06:00:00Z"));
        assert_eq!(buckets[5].start, utc("2024-03-01T11:00:00Z"));
        let counts: Vec<_> = buckets.iter().map(|b| b.aggregate).collect();
        assert_eq!(counts, vec![0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_buckets_follow_viewer_offset() {
        // 23:30 UTC is 08:30 the next day in UTC+9.
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let points = vec![point("2024-03-01T23:30:00Z"), point("2024-03-02T01:00:00Z")];
        let buckets = aggregate_with(
            &points,
            &range("2024-02-26T00:00:00Z", "2024-03-04T00:00:00Z"),
            &tokyo,
            Granularity::Day,
            count,
            AggregateOptions::sparse(),
        );
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].local_start, naive("2024-03-02T00:00:00"));
        assert_eq!(buckets[0].start, utc("2024-03-01T15:00:00Z"));
        assert_eq!(buckets[0].aggregate, 2);
    }

    #[test]
    fn test_same_local_day_across_spring_forward() {
        // 00:30 EST and 23:30 EDT on 2024-03-10 are 22h apart in absolute time.
        let points = vec![point("2024-03-10T05:30:00Z"), point("2024-03-11T03:30:00Z")];
        let buckets = aggregate_with(
            &points,
            &range("2024-03-04T05:00:00Z", "2024-03-14T04:00:00Z"),
            &Eastern2024,
            Granularity::Day,
            count,
            AggregateOptions::sparse(),
        );
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].local_start, naive("2024-03-10T00:00:00"));
        assert_eq!(buckets[0].start, utc("2024-03-10T05:00:00Z"));
        assert_eq!(buckets[0].aggregate, 2);
    }

    #[test]
    fn test_repeated_hour_shares_bucket_on_fall_back() {
        // 01:15 EDT and 01:45 EST on 2024-11-03 are both in the local 01:00 hour.
        let points = vec![point("2024-11-03T05:15:00Z"), point("2024-11-03T06:45:00Z")];
        let buckets = aggregate_with(
            &points,
            &range("2024-11-03T04:00:00Z", "2024-11-04T05:00:00Z"),
            &Eastern2024,
            Granularity::Hour,
            count,
            AggregateOptions::sparse(),
        );
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].local_start, naive("2024-11-03T01:00:00"));
        assert_eq!(buckets[0].start, utc("2024-11-03T05:00:00Z"));
    }

    #[test]
    fn test_zero_fill_skips_missing_hour() {
        // Local 00:00..05:00 on the spring-forward day has only four hours.
        let buckets = aggregate_with(
            &[],
            &range("2024-03-10T05:00:00Z", "2024-03-10T09:00:00Z"),
            &Eastern2024,
            Granularity::Hour,
            count,
            AggregateOptions::zero_filled(),
        );
        let starts: Vec<_> = buckets.iter().map(|b| b.local_start).collect();
        assert_eq!(
            starts,
            vec![
                naive("2024-03-10T00:00:00"),
                naive("2024-03-10T01:00:00"),
                naive("2024-03-10T03:00:00"),
                naive("2024-03-10T04:00:00"),
            ]
        );
    }

    #[test]
    fn test_week_start() {
        // 2024-03-06 is a Wednesday.
        let local = naive("2024-03-06T15:20:00");
        assert_eq!(
            floor_local(local, Granularity::Week, Weekday::Mon),
            naive("2024-03-04T00:00:00")
        );
        assert_eq!(
            floor_local(local, Granularity::Week, Weekday::Sun),
            naive("2024-03-03T00:00:00")
        );
        assert_eq!(
            floor_local(local, Granularity::Week, Weekday::Wed),
            naive("2024-03-06T00:00:00")
        );
    }

    #[test]
    fn test_reducer_called_once_per_bucket() {
        use std::cell::Cell;

        let calls = Cell::new(0);
        let points = vec![
            point("2024-03-01T09:00:00Z"),
            point("2024-03-01T09:30:00Z"),
            point("2024-03-01T11:00:00Z"),
        ];
        let buckets = aggregate(
            &points,
            &range("2024-03-01T00:00:00Z", "2024-03-02T00:00:00Z"),
            &Utc,
            |pts: &[TimeseriesPoint]| {
                calls.set(calls.get() + 1);
                pts.len()
            },
            AggregateOptions::sparse(),
        );
        assert_eq!(buckets.len(), 2);
        assert_eq!(calls.get(), 2);
    }
}
