//! The dashboard's data service.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use dashboard_analytics::{AggregateOptions, aggregate, compare_windows, reduce};
use dashboard_cache::{FailurePolicy, QueryCache, Subscription};
use dashboard_core::{
    Bucket, CallRecord, CampaignSummary, Clock, CreditBalance, Customer, DashboardConfig,
    DateRange, Inquiry, InquiryStatus, MetricsSnapshot, PeriodComparison, Result, SystemClock,
    TimeseriesPoint,
};
use dashboard_gateway::{CallQuery, CustomerQuery, Gateway};
use tracing::{debug, instrument};

use crate::descriptors;

const DEFAULT_TTL: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Cached access to every dataset the dashboard shows.
///
/// Each dataset has its own [`QueryCache`]; all of them share one clock and
/// one [`Gateway`]. Views holding a `Dashboard` (or a clone of it) see the
/// same cached data.
///
/// # Example
///
/// ```rust,ignore
/// use dashboard::{Dashboard, DashboardConfig, DateRange};
///
/// let dashboard = Dashboard::from_config(&DashboardConfig::from_env()?)?;
/// let mut balance = dashboard.watch_credit_balance()?;
/// balance.changed().await?;
/// println!("{:?}", balance.latest());
/// ```
#[derive(Clone, Debug)]
pub struct Dashboard {
    gateway: Gateway,
    calls: QueryCache<Arc<Vec<CallRecord>>>,
    customers: QueryCache<Arc<Vec<Customer>>>,
    campaigns: QueryCache<Arc<Vec<CampaignSummary>>>,
    balance: QueryCache<CreditBalance>,
    inquiries: QueryCache<Arc<Vec<Inquiry>>>,
    metrics: QueryCache<MetricsSnapshot>,
    ttl: Duration,
    poll_interval: Duration,
}

impl Dashboard {
    /// Creates a dashboard over `gateway` using the system clock.
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        Self::with_clock(gateway, Arc::new(SystemClock))
    }

    /// Creates a dashboard whose caches read time from `clock`.
    #[must_use]
    pub fn with_clock(gateway: Gateway, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateway,
            calls: QueryCache::with_clock(Arc::clone(&clock)),
            customers: QueryCache::with_clock(Arc::clone(&clock)),
            campaigns: QueryCache::with_clock(Arc::clone(&clock)),
            balance: QueryCache::with_clock(Arc::clone(&clock)),
            inquiries: QueryCache::with_clock(Arc::clone(&clock)),
            metrics: QueryCache::with_clock(clock),
            ttl: DEFAULT_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Builds the gateway and caches from environment configuration.
    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        Ok(Self::new(Gateway::from_config(config)?)
            .with_ttl(config.cache_ttl)
            .with_poll_interval(config.poll_interval))
    }

    /// Sets the freshness window of every query.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the refresh interval of polled queries.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets how every cache reacts to a failed refetch.
    ///
    /// Must be called before the caches are shared with clones.
    #[must_use]
    pub fn with_failure_policy(self, policy: FailurePolicy) -> Self {
        Self {
            calls: self.calls.with_failure_policy(policy),
            customers: self.customers.with_failure_policy(policy),
            campaigns: self.campaigns.with_failure_policy(policy),
            balance: self.balance.with_failure_policy(policy),
            inquiries: self.inquiries.with_failure_policy(policy),
            metrics: self.metrics.with_failure_policy(policy),
            ..self
        }
    }

    /// The underlying gateway.
    #[must_use]
    pub const fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Registers a callback run when the backend rejects the session.
    pub fn on_unauthorized<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.gateway.on_unauthorized(handler);
    }

    /// Call log matching `query`.
    pub async fn call_logs(&self, query: &CallQuery) -> Result<Arc<Vec<CallRecord>>> {
        let gateway = self.gateway.clone();
        let owned = query.clone();
        self.calls
            .get(
                &descriptors::calls(query),
                move || async move { gateway.calls(&owned).await.map(Arc::new) },
                self.ttl,
            )
            .await
    }

    /// Number of calls per bucket of `range`, bucketed on `tz`'s wall clock.
    #[instrument(skip(self, tz, options), fields(from = %range.from, to = %range.to))]
    pub async fn call_volume<Tz>(
        &self,
        range: &DateRange,
        tz: &Tz,
        options: AggregateOptions,
    ) -> Result<Vec<Bucket<usize>>>
    where
        Tz: TimeZone + Sync,
    {
        let calls = self.call_logs(&CallQuery::in_range(*range)).await?;
        let points = to_points(&calls);
        Ok(aggregate(&points, range, tz, reduce::count, options))
    }

    /// Call count over `range` against the window of identical length before it.
    pub async fn call_volume_comparison(&self, range: &DateRange) -> Result<PeriodComparison> {
        let points = self.calls_spanning_previous(range).await?;
        compare_windows(&points, range, |pts| Some(pts.len() as f64))
    }

    /// Mean call duration over `range` against the window before it.
    ///
    /// A window without calls has no mean, so an empty previous window
    /// yields [`Trend::NoData`](dashboard_core::Trend::NoData).
    pub async fn call_duration_comparison(&self, range: &DateRange) -> Result<PeriodComparison> {
        let points = self.calls_spanning_previous(range).await?;
        compare_windows(&points, range, reduce::mean(CallRecord::DURATION))
    }

    async fn calls_spanning_previous(&self, range: &DateRange) -> Result<Vec<TimeseriesPoint>> {
        let both = DateRange::new(range.previous()?.from, range.to)?;
        let calls = self.call_logs(&CallQuery::in_range(both)).await?;
        Ok(to_points(&calls))
    }

    /// Customers matching `query`.
    pub async fn customers(&self, query: &CustomerQuery) -> Result<Arc<Vec<Customer>>> {
        let gateway = self.gateway.clone();
        let owned = query.clone();
        self.customers
            .get(
                &descriptors::customers(query),
                move || async move { gateway.customers(&owned).await.map(Arc::new) },
                self.ttl,
            )
            .await
    }

    /// Per-campaign summaries.
    pub async fn campaigns(&self) -> Result<Arc<Vec<CampaignSummary>>> {
        let gateway = self.gateway.clone();
        self.campaigns
            .get(
                &descriptors::campaigns(),
                move || async move { gateway.campaigns().await.map(Arc::new) },
                self.ttl,
            )
            .await
    }

    /// Remaining credits.
    pub async fn credit_balance(&self) -> Result<CreditBalance> {
        let gateway = self.gateway.clone();
        self.balance
            .get(
                &descriptors::credit_balance(),
                move || async move { gateway.credit_balance().await },
                self.ttl,
            )
            .await
    }

    /// Keeps the credit balance refreshed every poll interval while the
    /// subscription is alive.
    pub fn watch_credit_balance(&self) -> Result<Subscription<CreditBalance>> {
        let gateway = self.gateway.clone();
        self.balance.subscribe(
            descriptors::credit_balance(),
            move || {
                let gateway = gateway.clone();
                async move { gateway.credit_balance().await }
            },
            self.ttl,
            self.poll_interval,
        )
    }

    /// Inquiries, optionally only those in `status`.
    pub async fn inquiries(&self, status: Option<InquiryStatus>) -> Result<Arc<Vec<Inquiry>>> {
        let gateway = self.gateway.clone();
        self.inquiries
            .get(
                &descriptors::inquiries(status),
                move || async move { gateway.inquiries(status).await.map(Arc::new) },
                self.ttl,
            )
            .await
    }

    /// Moves an inquiry to `status`.
    ///
    /// On success every cached inquiry list and metrics snapshot is marked
    /// stale, since both count inquiries.
    #[instrument(skip(self))]
    pub async fn update_inquiry_status(&self, id: &str, status: InquiryStatus) -> Result<()> {
        self.gateway.update_inquiry_status(id, status).await?;
        let lists = self.inquiries.invalidate(&descriptors::inquiries_prefix());
        let snapshots = self.metrics.invalidate(&descriptors::metrics_prefix());
        debug!(lists, snapshots, "Invalidated after inquiry update");
        Ok(())
    }

    /// Headline totals for `range`.
    pub async fn metrics(&self, range: &DateRange) -> Result<MetricsSnapshot> {
        let gateway = self.gateway.clone();
        let owned = *range;
        self.metrics
            .get(
                &descriptors::metrics(range),
                move || async move { gateway.metrics(&owned).await },
                self.ttl,
            )
            .await
    }

    /// Marks every cached call query stale. Returns how many were marked.
    pub fn invalidate_calls(&self) -> usize {
        self.calls.invalidate(&descriptors::calls_prefix())
    }

    /// Marks every cached query of every dataset stale.
    pub fn invalidate_all(&self) -> usize {
        let everything = dashboard_core::RequestDescriptor::default();
        let total = self.calls.invalidate(&everything)
            + self.customers.invalidate(&everything)
            + self.campaigns.invalidate(&everything)
            + self.balance.invalidate(&everything)
            + self.inquiries.invalidate(&everything)
            + self.metrics.invalidate(&everything);
        debug!(total, "Invalidated all queries");
        total
    }

    /// Drops entries of every dataset last fetched `older_than` ago or
    /// earlier. Polled and in-flight entries are kept.
    pub fn remove_expired(&self, older_than: Duration) -> usize {
        self.calls.remove_expired(older_than)
            + self.customers.remove_expired(older_than)
            + self.campaigns.remove_expired(older_than)
            + self.balance.remove_expired(older_than)
            + self.inquiries.remove_expired(older_than)
            + self.metrics.remove_expired(older_than)
    }
}

fn to_points(calls: &[CallRecord]) -> Vec<TimeseriesPoint> {
    calls.iter().map(CallRecord::to_point).collect()
}
