#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/callboard/dashboard/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Call-center dashboard data layer.
//!
//! This crate re-exports the core types, the query cache, the gateway and the
//! analytics helpers, and provides [`Dashboard`], which wires them into one
//! cached service.

// Core types and traits
pub use dashboard_core::*;

// Cache
pub use dashboard_cache::{Cached, EntryState, FailurePolicy, Lookup, QueryCache, Subscription};

// Gateway
pub use dashboard_gateway::{CallQuery, CustomerQuery, Gateway, Method};

// Analytics
pub use dashboard_analytics::{
    AggregateOptions, aggregate, aggregate_local, aggregate_with, compare, compare_windows,
    floor_local, reduce,
};

/// Cache keys for backend queries.
pub mod descriptors;
mod service;
pub use service::Dashboard;
