//! Cache keys for each backend query.

use dashboard_core::{DateRange, InquiryStatus, RequestDescriptor};
use dashboard_gateway::{CallQuery, CustomerQuery};

/// Prefix of every call log query.
pub fn calls_prefix() -> RequestDescriptor {
    RequestDescriptor::new("calls")
}

/// Key of one call log query.
pub fn calls(query: &CallQuery) -> RequestDescriptor {
    calls_prefix()
        .with_opt(query.range.map(|r| r.from))
        .with_opt(query.range.map(|r| r.to))
        .with_opt(query.campaign.clone())
        .with_opt(query.status.map(|s| s.as_str()))
        .with_opt(query.search.clone())
        .with_opt(query.page)
        .with_opt(query.limit)
}

/// Key of one customer query.
pub fn customers(query: &CustomerQuery) -> RequestDescriptor {
    RequestDescriptor::new("customers")
        .with_opt(query.search.clone())
        .with_opt(query.page)
        .with_opt(query.limit)
}

/// Key of the campaign summaries.
pub fn campaigns() -> RequestDescriptor {
    RequestDescriptor::new("campaigns")
}

/// Key of the credit balance.
pub fn credit_balance() -> RequestDescriptor {
    RequestDescriptor::new("credits").with("balance")
}

/// Prefix of every inquiry query.
pub fn inquiries_prefix() -> RequestDescriptor {
    RequestDescriptor::new("inquiries")
}

/// Key of one inquiry query.
pub fn inquiries(status: Option<InquiryStatus>) -> RequestDescriptor {
    inquiries_prefix().with_opt(status.map(|s| s.as_str()))
}

/// Prefix of every metrics query.
pub fn metrics_prefix() -> RequestDescriptor {
    RequestDescriptor::new("metrics")
}

/// Key of the metrics for `range`.
pub fn metrics(range: &DateRange) -> RequestDescriptor {
    metrics_prefix().with(range.from).with(range.to)
}
