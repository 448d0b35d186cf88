//! Typed wrappers over the backend's REST endpoints.

use chrono::{DateTime, SecondsFormat, Utc};
use dashboard_core::{
    CallRecord, CallStatus, CampaignSummary, CreditBalance, Customer, DashError, DateRange,
    Inquiry, InquiryStatus, MetricsSnapshot, Result,
};
use reqwest::Method;
use serde_json::json;
use tracing::debug;

use crate::client::Gateway;

const CALLS: &str = "/calls";
const CUSTOMERS: &str = "/customers";
const CAMPAIGNS: &str = "/campaigns";
const CREDIT_BALANCE: &str = "/credits/balance";
const INQUIRIES: &str = "/inquiries";
const METRICS: &str = "/metrics";

/// Query parameters as sent on the wire.
pub type Params = Vec<(&'static str, String)>;

/// RFC 3339 in UTC, with as many fractional digits as `t` carries.
fn instant(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn push_range(params: &mut Params, range: &DateRange) {
    params.push(("from", instant(range.from)));
    params.push(("to", instant(range.to)));
}

/// Filters for the call log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallQuery {
    /// Only calls created within this range.
    pub range: Option<DateRange>,
    /// Only calls placed by this campaign.
    pub campaign: Option<String>,
    /// Only calls that ended in this status.
    pub status: Option<CallStatus>,
    /// Free-text search over phone numbers and ids.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
}

impl CallQuery {
    /// Calls within `range`.
    #[must_use]
    pub fn in_range(range: DateRange) -> Self {
        Self {
            range: Some(range),
            ..Self::default()
        }
    }

    /// Restricts to one campaign.
    #[must_use]
    pub fn with_campaign(mut self, campaign: impl Into<String>) -> Self {
        self.campaign = Some(campaign.into());
        self
    }

    /// Restricts to one call status.
    #[must_use]
    pub const fn with_status(mut self, status: CallStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the search text.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Selects a page.
    #[must_use]
    pub const fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Wire parameters, unset filters omitted.
    #[must_use]
    pub fn params(&self) -> Params {
        let mut params = Params::new();
        if let Some(range) = &self.range {
            push_range(&mut params, range);
        }
        if let Some(campaign) = &self.campaign {
            params.push(("campaign", campaign.clone()));
        }
        if let Some(status) = self.status {
            params.push(("status", status.as_str().to_string()));
        }
        if let Some(search) = &self.search {
            params.push(("search", search.clone()));
        }
        if let Some(page) = self.page {
            params.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

/// Filters for the customer list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerQuery {
    /// Free-text search over names, phones and emails.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
}

impl CustomerQuery {
    /// Sets the search text.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Selects a page of `limit` customers.
    #[must_use]
    pub const fn with_page(mut self, page: u32, limit: u32) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    /// Wire parameters, unset filters omitted.
    #[must_use]
    pub fn params(&self) -> Params {
        let mut params = Params::new();
        if let Some(search) = &self.search {
            params.push(("search", search.clone()));
        }
        if let Some(page) = self.page {
            params.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

impl Gateway {
    /// Fetches the call log.
    pub async fn calls(&self, query: &CallQuery) -> Result<Vec<CallRecord>> {
        let calls: Vec<CallRecord> = self.get(CALLS, &query.params()).await?;
        debug!(count = calls.len(), "Fetched calls");
        Ok(calls)
    }

    /// Fetches customers.
    pub async fn customers(&self, query: &CustomerQuery) -> Result<Vec<Customer>> {
        self.get(CUSTOMERS, &query.params()).await
    }

    /// Fetches per-campaign summaries.
    pub async fn campaigns(&self) -> Result<Vec<CampaignSummary>> {
        self.get(CAMPAIGNS, &[]).await
    }

    /// Fetches the account's remaining credits.
    pub async fn credit_balance(&self) -> Result<CreditBalance> {
        self.get(CREDIT_BALANCE, &[]).await
    }

    /// Fetches inquiries, optionally only those in `status`.
    pub async fn inquiries(&self, status: Option<InquiryStatus>) -> Result<Vec<Inquiry>> {
        let params: Params = status
            .map(|s| vec![("status", s.as_str().to_string())])
            .unwrap_or_default();
        self.get(INQUIRIES, &params).await
    }

    /// Moves an inquiry to `status`.
    pub async fn update_inquiry_status(&self, id: &str, status: InquiryStatus) -> Result<()> {
        if id.is_empty() || id.contains('/') {
            return Err(DashError::InvalidParameter(format!("inquiry id {id:?}")));
        }
        let path = format!("{INQUIRIES}/{id}/status");
        self.send(
            Method::PATCH,
            &path,
            &[],
            Some(&json!({ "status": status.as_str() })),
        )
        .await?;
        Ok(())
    }

    /// Fetches headline totals for `range`.
    pub async fn metrics(&self, range: &DateRange) -> Result<MetricsSnapshot> {
        let mut params = Params::new();
        push_range(&mut params, range);
        self.get(METRICS, &params).await
    }
}
