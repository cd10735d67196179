mod aggregator;
mod time_range;

pub use aggregator::{
    fold_orders, DashboardReport, DashboardScope, DashboardSummary, SalesDashboard, StatusBreakdown,
    TimeSeriesPoint,
};
pub use time_range::{local_day_start, Bucket, Granularity, ResolvedRange, TimeRange};

use crate::store::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Repository(#[from] RepoError),
}

impl DashboardError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, DashboardError::Validation(_))
    }
}
