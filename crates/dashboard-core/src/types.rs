//! Core data types for the dashboard data layer.
//!
//! This module defines the analytics structures:
//!
//! - [`DateRange`] - Half-open instant range selected by the viewer
//! - [`TimeseriesPoint`] - Timestamped record with numeric fields
//! - [`Bucket`] - Group of points sharing one bucket start
//! - [`PeriodComparison`] - Current vs. previous period delta
//!
//! and the backend records the dashboard displays ([`CallRecord`],
//! [`Customer`], [`CampaignSummary`], [`CreditBalance`], [`Inquiry`],
//! [`MetricsSnapshot`]).

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{DashError, Result};

/// A half-open `[from, to)` range of instants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive start.
    pub from: DateTime<Utc>,
    /// Exclusive end.
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// Creates a range, rejecting one that ends before it starts.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if to < from {
            return Err(DashError::InvalidParameter(format!(
                "range ends before it starts: {from} > {to}"
            )));
        }
        Ok(Self { from, to })
    }

    /// Length of the range.
    #[must_use]
    pub fn span(&self) -> TimeDelta {
        self.to - self.from
    }

    /// The window of identical duration immediately preceding this one.
    ///
    /// A Monday–Wednesday range yields the preceding Friday–Sunday. Fails
    /// when that window starts before the earliest representable instant.
    pub fn previous(&self) -> Result<Self> {
        let from = self.from.checked_sub_signed(self.span()).ok_or_else(|| {
            DashError::InvalidParameter(format!(
                "no representable window precedes {} .. {}",
                self.from, self.to
            ))
        })?;
        Ok(Self {
            from,
            to: self.from,
        })
    }

    /// Returns true if `instant` lies inside the range.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.to
    }
}

/// A timestamped record reduced to numeric fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    /// When the record happened.
    pub timestamp: DateTime<Utc>,
    /// Metric name to value.
    pub fields: BTreeMap<String, f64>,
}

impl TimeseriesPoint {
    /// Creates a point with no fields.
    #[must_use]
    pub const fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Reads a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}

/// A group of points sharing one bucket start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bucket<T> {
    /// Instant the bucket starts at.
    pub start: DateTime<Utc>,
    /// Wall-clock start of the bucket in the viewer's timezone.
    pub local_start: NaiveDateTime,
    /// Points in this bucket, in input order.
    pub points: Vec<TimeseriesPoint>,
    /// Reducer output over `points`.
    pub aggregate: T,
}

/// Direction of a period-over-period change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trend {
    /// Current value grew or held steady.
    Up,
    /// Current value shrank.
    Down,
    /// Both periods are zero.
    Neutral,
    /// There is no previous period to compare against.
    NoData,
}

/// Current vs. previous period comparison of a scalar metric.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodComparison {
    /// Metric value in the selected range.
    pub current_value: f64,
    /// Metric value in the preceding window, if known.
    pub previous_value: Option<f64>,
    /// Percentage change; `None` when the previous value is zero or absent.
    pub percent_change: Option<f64>,
    /// Direction of the change.
    pub trend: Trend,
}

/// Outcome of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Call connected and finished normally.
    Completed,
    /// Nobody answered.
    NoAnswer,
    /// Line was busy.
    Busy,
    /// Call failed to connect.
    Failed,
    /// Call is still running.
    InProgress,
    /// Any status this client does not know.
    #[serde(other)]
    Unknown,
}

impl CallStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NoAnswer => "no_answer",
            Self::Busy => "busy",
            Self::Failed => "failed",
            Self::InProgress => "in_progress",
            Self::Unknown => "unknown",
        }
    }
}

/// One entry of the call log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// Backend identifier.
    pub id: String,
    /// When the call started.
    pub created_at: DateTime<Utc>,
    /// Call length in seconds.
    #[serde(default)]
    pub duration_seconds: f64,
    /// Outcome of the call.
    pub status: CallStatus,
    /// Campaign the call belongs to.
    #[serde(default)]
    pub campaign_id: Option<String>,
    /// Customer phone number.
    #[serde(default)]
    pub customer_phone: Option<String>,
    /// Credits charged for the call.
    #[serde(default)]
    pub cost: f64,
}

impl CallRecord {
    /// Field name carrying the call duration in a [`TimeseriesPoint`].
    pub const DURATION: &'static str = "duration_seconds";
    /// Field name carrying the call cost in a [`TimeseriesPoint`].
    pub const COST: &'static str = "cost";

    /// Converts the record into a timeseries point keyed on `created_at`.
    #[must_use]
    pub fn to_point(&self) -> TimeseriesPoint {
        TimeseriesPoint::new(self.created_at)
            .with_field(Self::DURATION, self.duration_seconds)
            .with_field(Self::COST, self.cost)
    }
}

/// A customer record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Backend identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// When the customer was created.
    pub created_at: DateTime<Utc>,
    /// Total calls placed to this customer.
    #[serde(default)]
    pub total_calls: u64,
}

/// Performance summary of one campaign.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSummary {
    /// Backend identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Calls placed.
    #[serde(default)]
    pub total_calls: u64,
    /// Calls that connected.
    #[serde(default)]
    pub answered_calls: u64,
    /// Mean call length in seconds.
    #[serde(default)]
    pub average_duration_seconds: f64,
}

impl CampaignSummary {
    /// Share of calls that connected, or `None` before any call was placed.
    #[must_use]
    pub fn answer_rate(&self) -> Option<f64> {
        if self.total_calls == 0 {
            return None;
        }
        Some(self.answered_calls as f64 / self.total_calls as f64)
    }
}

/// Billing credit balance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    /// Remaining credits.
    pub credits: f64,
    /// Billing currency.
    #[serde(default)]
    pub currency: Option<String>,
    /// When the backend last recomputed the balance.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Lifecycle state of an inquiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryStatus {
    /// Waiting for an operator.
    Pending,
    /// Being worked on.
    InProgress,
    /// Closed.
    Resolved,
}

impl InquiryStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for InquiryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InquiryStatus {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            other => Err(DashError::InvalidParameter(format!(
                "unknown inquiry status: {other}"
            ))),
        }
    }
}

/// A customer inquiry raised from a call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inquiry {
    /// Backend identifier.
    pub id: String,
    /// Customer the inquiry belongs to.
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Short description.
    pub subject: String,
    /// Current status.
    pub status: InquiryStatus,
    /// When the inquiry was raised.
    pub created_at: DateTime<Utc>,
}

/// Server-computed headline metrics for a date range.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Calls in the range.
    #[serde(default)]
    pub total_calls: u64,
    /// Total talk time in seconds.
    #[serde(default)]
    pub total_duration_seconds: f64,
    /// Credits spent.
    #[serde(default)]
    pub credits_used: f64,
    /// Inquiries raised.
    #[serde(default)]
    pub inquiries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_previous_window_same_duration() {
        // Mon 2024-03-04 .. Thu 2024-03-07 (three days)
        let range = DateRange::new(at(2024, 3, 4, 0), at(2024, 3, 7, 0)).unwrap();
        let prev = range.previous().unwrap();
        assert_eq!(prev.from, at(2024, 3, 1, 0));
        assert_eq!(prev.to, range.from);
        assert_eq!(prev.span(), range.span());
    }

    #[test]
    fn test_previous_window_out_of_bounds() {
        let whole = DateRange::new(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC).unwrap();
        assert!(matches!(whole.previous(), Err(DashError::InvalidParameter(_))));

        let empty = DateRange::new(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MIN_UTC).unwrap();
        assert_eq!(empty.previous().unwrap(), empty);
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let err = DateRange::new(at(2024, 3, 2, 0), at(2024, 3, 1, 0)).unwrap_err();
        assert!(matches!(err, DashError::InvalidParameter(_)));
    }

    #[test]
    fn test_contains_is_half_open() {
        let range = DateRange::new(at(2024, 3, 1, 0), at(2024, 3, 2, 0)).unwrap();
        assert!(range.contains(at(2024, 3, 1, 0)));
        assert!(range.contains(at(2024, 3, 1, 23)));
        assert!(!range.contains(at(2024, 3, 2, 0)));
    }

    #[test]
    fn test_call_record_deserialize_and_point() {
        let json = r#"{
            "id": "c1",
            "createdAt": "2024-03-01T09:00:00Z",
            "durationSeconds": 42.0,
            "status": "voicemail",
            "cost": 0.5
        }"#;
        let call: CallRecord = serde_json::from_str(json).unwrap();
        assert_eq!(call.status, CallStatus::Unknown);
        assert_eq!(call.campaign_id, None);

        let point = call.to_point();
        assert_eq!(point.timestamp, at(2024, 3, 1, 9));
        assert_eq!(point.field(CallRecord::DURATION), Some(42.0));
        assert_eq!(point.field(CallRecord::COST), Some(0.5));
    }

    #[test]
    fn test_answer_rate() {
        let mut campaign = CampaignSummary {
            id: "x".into(),
            name: "Renewals".into(),
            total_calls: 0,
            answered_calls: 0,
            average_duration_seconds: 0.0,
        };
        assert_eq!(campaign.answer_rate(), None);
        campaign.total_calls = 4;
        campaign.answered_calls = 3;
        assert_eq!(campaign.answer_rate(), Some(0.75));
    }

    #[test]
    fn test_inquiry_status_round_trip_names() {
        for status in [
            InquiryStatus::Pending,
            InquiryStatus::InProgress,
            InquiryStatus::Resolved,
        ] {
            assert_eq!(status.as_str().parse::<InquiryStatus>().unwrap(), status);
        }
        assert!("closed".parse::<InquiryStatus>().is_err());
    }
}
