//! Period-over-period comparison.
//!
//! The previous period is always the window of identical duration
//! immediately preceding the selected range ([`DateRange::previous`]).
//! [`compare`] itself is plain arithmetic over values the caller already
//! reduced for each window.

use dashboard_core::{DateRange, PeriodComparison, Result, TimeseriesPoint, Trend};

/// Compares `current` against `previous`.
///
/// - no previous value: no percentage, [`Trend::NoData`]
/// - both zero: no percentage, [`Trend::Neutral`]
/// - previous zero, current not: no percentage, [`Trend::Up`] or [`Trend::Down`] by sign
/// - otherwise `(current - previous) / previous * 100`, [`Trend::Up`] when non-negative
///
/// A non-finite `previous` counts as absent, and `percent_change` is never
/// infinite or NaN.
#[must_use]
pub fn compare(current: f64, previous: Option<f64>) -> PeriodComparison {
    let previous = previous.filter(|p| p.is_finite());

    let (percent_change, trend) = match previous {
        None => (None, Trend::NoData),
        Some(p) if p == 0.0 => {
            let trend = if current == 0.0 {
                Trend::Neutral
            } else if current > 0.0 {
                Trend::Up
            } else {
                Trend::Down
            };
            (None, trend)
        }
        Some(p) => {
            let change = (current - p) / p * 100.0;
            if !change.is_finite() {
                (None, Trend::NoData)
            } else if change >= 0.0 {
                (Some(change), Trend::Up)
            } else {
                (Some(change), Trend::Down)
            }
        }
    };

    PeriodComparison {
        current_value: current,
        previous_value: previous,
        percent_change,
        trend,
    }
}

/// Reduces the points of `range` and of the window preceding it, then
/// compares the two.
///
/// `reduce` returns `None` when a window has nothing to report (for example a
/// mean over no points); an empty current window then counts as zero, an
/// empty previous window as absent. Fails when no window of the same length
/// fits before `range`.
pub fn compare_windows<R>(
    points: &[TimeseriesPoint],
    range: &DateRange,
    reduce: R,
) -> Result<PeriodComparison>
where
    R: Fn(&[TimeseriesPoint]) -> Option<f64>,
{
    let previous_range = range.previous()?;
    let (current, previous): (Vec<_>, Vec<_>) = points
        .iter()
        .filter(|p| range.contains(p.timestamp) || previous_range.contains(p.timestamp))
        .cloned()
        .partition(|p| range.contains(p.timestamp));

    Ok(compare(reduce(&current).unwrap_or(0.0), reduce(&previous)))
}
