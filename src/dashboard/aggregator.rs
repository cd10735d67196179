use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::time_range::{Granularity, ResolvedRange, TimeRange};
use super::DashboardError;
use crate::domain::order::{Order, OrderStatus};
use crate::store::{OrderFilter, OrderRepository};

// ============================================================================
// Sales Dashboard Aggregator
// ============================================================================
//
// One scan of the orders in range, then one fold that feeds all three
// projections (summary, time series, status breakdown). Cancelled orders are
// counted but excluded from every revenue figure.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DashboardScope {
    /// Platform-owned orders, or every order when `include_all_vendors`
    Platform { include_all_vendors: bool },
    /// Orders carrying at least one line of this vendor
    Vendor(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub pending_amount: Decimal,
    pub gross_revenue_all: Decimal,
    pub total_discount_all: Decimal,
    pub net_revenue_all: Decimal,
    pub avg_order_value_all: Decimal,
    pub gross_revenue_fulfilled: Decimal,
    pub cancelled_orders: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub label: String,
    pub bucket_start: DateTime<Utc>,
    pub orders: u64,
    pub gross_revenue_all: Decimal,
    pub total_discount_all: Decimal,
    pub net_revenue_all: Decimal,
    pub gross_revenue_fulfilled: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBreakdown {
    pub status: OrderStatus,
    pub orders: u64,
    pub gross_revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub granularity: Granularity,
    pub timezone: String,
    pub summary: DashboardSummary,
    pub time_series: Vec<TimeSeriesPoint>,
    pub status_breakdown: Vec<StatusBreakdown>,
}

pub struct SalesDashboard {
    orders: Arc<dyn OrderRepository>,
    timezone: Tz,
}

impl SalesDashboard {
    pub fn new(orders: Arc<dyn OrderRepository>, timezone: Tz) -> Self {
        Self { orders, timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub async fn get_dashboard(
        &self,
        range: TimeRange,
        scope: &DashboardScope,
    ) -> Result<DashboardReport, DashboardError> {
        self.get_dashboard_at(range, scope, Utc::now()).await
    }

    /// Same as `get_dashboard` with an explicit clock
    pub async fn get_dashboard_at(
        &self,
        range: TimeRange,
        scope: &DashboardScope,
        now: DateTime<Utc>,
    ) -> Result<DashboardReport, DashboardError> {
        let resolved = range.resolve(now, self.timezone)?;
        let filter = scope_filter(scope, &resolved);

        let orders = self.orders.scan(&filter).await?;
        let report = fold_orders(&orders, &resolved, self.timezone);

        tracing::debug!(
            range = ?range,
            scope = ?scope,
            scanned = orders.len(),
            total_orders = report.summary.total_orders,
            "Dashboard computed"
        );

        Ok(report)
    }
}

fn scope_filter(scope: &DashboardScope, range: &ResolvedRange) -> OrderFilter {
    let mut filter = OrderFilter {
        created_from: Some(range.start),
        created_to: Some(range.end),
        ..Default::default()
    };

    match scope {
        DashboardScope::Platform { include_all_vendors } => filter.admin_only = !include_all_vendors,
        DashboardScope::Vendor(vendor_id) => filter.vendor_id = Some(vendor_id.clone()),
    }

    filter
}

/// Single pass over `orders` producing every projection
pub fn fold_orders(orders: &[Order], range: &ResolvedRange, timezone: Tz) -> DashboardReport {
    let mut summary = DashboardSummary::default();
    let mut series: Vec<TimeSeriesPoint> = range
        .buckets
        .iter()
        .map(|bucket| TimeSeriesPoint {
            label: bucket.label.clone(),
            bucket_start: bucket.start,
            orders: 0,
            gross_revenue_all: Decimal::ZERO,
            total_discount_all: Decimal::ZERO,
            net_revenue_all: Decimal::ZERO,
            gross_revenue_fulfilled: Decimal::ZERO,
        })
        .collect();
    let mut by_status: HashMap<OrderStatus, (u64, Decimal)> = HashMap::new();

    for order in orders {
        let Some(bucket) = range.bucket_index(order.created_at) else {
            continue;
        };

        if order.status == OrderStatus::Cancelled {
            summary.cancelled_orders += 1;
            continue;
        }

        let total = order.effective_total();
        let discount = order.total_discount;
        let fulfilled = order.status.is_fulfilled();

        summary.total_orders += 1;
        summary.gross_revenue_all += total;
        summary.total_discount_all += discount;
        if order.status == OrderStatus::Pending {
            summary.pending_orders += 1;
            summary.pending_amount += total;
        }
        if fulfilled {
            summary.gross_revenue_fulfilled += total;
        }

        if let Some(point) = series.get_mut(bucket) {
            point.orders += 1;
            point.gross_revenue_all += total;
            point.total_discount_all += discount;
            if fulfilled {
                point.gross_revenue_fulfilled += total;
            }
        }

        let entry = by_status.entry(order.status).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += total;
    }

    summary.net_revenue_all = summary.gross_revenue_all - summary.total_discount_all;
    summary.avg_order_value_all = if summary.total_orders == 0 {
        Decimal::ZERO
    } else {
        (summary.gross_revenue_all / Decimal::from(summary.total_orders)).round_dp(2)
    };

    for point in &mut series {
        point.net_revenue_all = point.gross_revenue_all - point.total_discount_all;
    }

    let mut status_breakdown: Vec<StatusBreakdown> = by_status
        .into_iter()
        .map(|(status, (orders, gross_revenue))| StatusBreakdown { status, orders, gross_revenue })
        .collect();
    status_breakdown.sort_by(|a, b| b.orders.cmp(&a.orders).then(a.status.cmp(&b.status)));

    DashboardReport {
        range_start: range.start,
        range_end: range.end,
        granularity: range.granularity,
        timezone: timezone.name().to_string(),
        summary,
        time_series: series,
        status_breakdown,
    }
}
