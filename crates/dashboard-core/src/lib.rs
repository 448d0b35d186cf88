#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/callboard/dashboard/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the call-center dashboard data layer.
//!
//! This crate provides the shared abstractions the other dashboard crates build on:
//!
//! - [`DashError`](error::DashError) - Error taxonomy for gateway, cache and config
//! - [`RequestDescriptor`](descriptor::RequestDescriptor) - Cache key of a backend query
//! - [`Granularity`](granularity::Granularity) - Bucket width and span policy
//! - [`Clock`](clock::Clock) - Injectable time source
//! - [`TokenSource`](auth::TokenSource) - Bearer token supplier
//! - [`DashboardConfig`](config::DashboardConfig) - Environment configuration

/// Bearer token sources.
pub mod auth;
/// Injectable time source.
pub mod clock;
/// Environment configuration.
pub mod config;
/// Request descriptors used as cache keys.
pub mod descriptor;
/// Error types for dashboard operations.
pub mod error;
/// Bucket granularity definitions.
pub mod granularity;
/// Core data types (ranges, points, buckets, records).
pub mod types;

// Re-export commonly used items at crate root
pub use auth::{FileTokenStore, StaticToken, TokenSource};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DashboardConfig;
pub use descriptor::{KeySegment, RequestDescriptor};
pub use error::{DashError, Result};
pub use granularity::Granularity;
pub use types::{
    Bucket, CallRecord, CallStatus, CampaignSummary, CreditBalance, Customer, DateRange, Inquiry,
    InquiryStatus, MetricsSnapshot, PeriodComparison, TimeseriesPoint, Trend,
};
