#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/callboard/dashboard/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Query cache for the dashboard data layer.
//!
//! - [`QueryCache`] - Keyed read-through cache with one fetch in flight per descriptor
//! - [`Subscription`] - Handle keeping an entry refreshed on a fixed interval
//! - [`EntryState`] - Fresh / Stale / Fetching / Invalid lifecycle of an entry

/// Cache entry lifecycle.
pub mod entry;
/// Read-through query cache.
pub mod query;
/// Periodic refresh subscriptions.
pub mod subscription;

pub use entry::EntryState;
pub use query::{Cached, FailurePolicy, Lookup, QueryCache};
pub use subscription::Subscription;
