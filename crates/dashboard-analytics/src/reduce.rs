//! Stock bucket reducers.

use dashboard_core::TimeseriesPoint;

/// Number of points.
#[must_use]
pub fn count(points: &[TimeseriesPoint]) -> usize {
    points.len()
}

/// Sum of `field` over the points that carry it.
pub fn sum(field: &str) -> impl Fn(&[TimeseriesPoint]) -> f64 + '_ {
    move |points| points.iter().filter_map(|p| p.field(field)).sum()
}

/// Mean of `field` over the points that carry it, `None` if none do.
pub fn mean(field: &str) -> impl Fn(&[TimeseriesPoint]) -> Option<f64> + '_ {
    move |points| {
        let (total, n) = points
            .iter()
            .filter_map(|p| p.field(field))
            .fold((0.0, 0usize), |(total, n), v| (total + v, n + 1));
        (n > 0).then(|| total / n as f64)
    }
}
