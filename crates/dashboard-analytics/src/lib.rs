#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/callboard/dashboard/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Aggregation over dashboard time series.
//!
//! - [`aggregate`](aggregate::aggregate) - Local-time hour / day / week buckets
//! - [`compare`](compare::compare) - Percentage change against the preceding period
//! - [`reduce`] - Stock bucket reducers

/// Time-bucketed aggregation.
pub mod aggregate;
/// Period-over-period comparison.
pub mod compare;
/// Bucket reducers.
pub mod reduce;

pub use aggregate::{AggregateOptions, aggregate, aggregate_local, aggregate_with, floor_local};
pub use compare::{compare, compare_windows};
