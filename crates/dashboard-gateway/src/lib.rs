#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/callboard/dashboard/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Remote data gateway for the dashboard backend.

/// HTTP transport and response decoding.
pub mod client;
/// Typed endpoint helpers.
pub mod endpoints;

pub use client::{Gateway, UnauthorizedHandler, decode};
pub use endpoints::{CallQuery, CustomerQuery, Params};
pub use reqwest::Method;
