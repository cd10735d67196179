// ============================================================================
// Storage Ports
// ============================================================================
//
// The fulfillment core never owns a store. It talks to three independently
// owned collaborators through these traits:
// - CatalogRepository: catalog entries with embedded variants (CAS on version)
// - OrderRepository: order documents (atomic multi-insert, CAS on version)
// - SyncOutbox: pending index-mirror updates and their dead letters
//
// Implementations are injected once at startup and shared as `Arc<dyn _>`.
//
// ============================================================================

pub mod memory;
pub mod scylla;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::CatalogEntry;
use crate::domain::order::{Order, OrderStatus};
use crate::mirror::IndexFields;
use crate::utils::IsTransient;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Version conflict on {entity} {id}: expected version {expected}")]
    Conflict { entity: &'static str, id: String, expected: i64 },

    #[error("{entity} already exists: {id}")]
    Duplicate { entity: &'static str, id: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RepoError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        RepoError::Backend(err.to_string())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RepoError::Conflict { .. })
    }
}

impl IsTransient for RepoError {
    fn is_transient(&self) -> bool {
        self.is_conflict()
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<CatalogEntry>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CatalogEntry>, RepoError>;

    /// Persist `entry` only if the stored version still equals
    /// `expected_version`. Callers bump `entry.version` before saving.
    async fn save(&self, entry: &CatalogEntry, expected_version: i64) -> Result<(), RepoError>;

    /// Insert a new entry; used by catalog seeding and tests
    async fn insert(&self, entry: &CatalogEntry) -> Result<(), RepoError>;
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Inclusive lower bound on `created_at`
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub created_to: Option<DateTime<Utc>>,
    pub statuses: Option<Vec<OrderStatus>>,
    /// Orders carrying at least one line item of this vendor
    pub vendor_id: Option<String>,
    pub admin_only: bool,
    pub user_id: Option<Uuid>,
    pub checkout_id: Option<Uuid>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(from) = self.created_from {
            if order.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if order.created_at >= to {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&order.status) {
                return false;
            }
        }
        if let Some(vendor_id) = &self.vendor_id {
            if !order.has_vendor(vendor_id) {
                return false;
            }
        }
        if self.admin_only && !order.is_admin {
            return false;
        }
        if self.user_id.is_some() && order.user_id != self.user_id {
            return false;
        }
        if let Some(checkout_id) = self.checkout_id {
            if order.checkout_id != checkout_id {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSort {
    #[default]
    NewestFirst,
    OldestFirst,
    LargestTotalFirst,
}

impl OrderSort {
    pub fn sort(&self, orders: &mut [Order]) {
        match self {
            OrderSort::NewestFirst => orders.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            OrderSort::OldestFirst => orders.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            OrderSort::LargestTotalFirst => {
                orders.sort_by(|a, b| b.effective_total().cmp(&a.effective_total()))
            }
        }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert all orders of one checkout atomically: all or none
    async fn create_many(&self, orders: &[Order]) -> Result<(), RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, RepoError>;

    /// Persist `order` only if the stored version equals `expected_version`
    async fn save(&self, order: &Order, expected_version: i64) -> Result<(), RepoError>;

    /// Every order matching `filter`, unordered. This is the single scan the
    /// dashboard folds over.
    async fn scan(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepoError>;

    /// Orders with a stock mutation that never reached its final write
    async fn find_with_pending_stock_op(&self) -> Result<Vec<Order>, RepoError>;

    async fn count_and_find(
        &self,
        filter: &OrderFilter,
        sort: OrderSort,
        skip: usize,
        limit: usize,
    ) -> Result<(usize, Vec<Order>), RepoError> {
        let mut orders = self.scan(filter).await?;
        let count = orders.len();
        sort.sort(&mut orders);
        let page = orders.into_iter().skip(skip).take(limit).collect();
        Ok((count, page))
    }
}

// ============================================================================
// Index Sync Outbox
// ============================================================================

/// A mirror update that could not be delivered inline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncIntent {
    pub id: Uuid,
    pub catalog_id: Uuid,
    /// Which fields to refresh; values are re-read at delivery time
    pub fields: IndexFields,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncIntent {
    pub fn new(catalog_id: Uuid, fields: IndexFields) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            catalog_id,
            fields,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub intent: SyncIntent,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OutboxBacklog {
    pub pending: usize,
    pub oldest_created_at: Option<DateTime<Utc>>,
}

impl OutboxBacklog {
    /// Age of the oldest undelivered update, i.e. worst-case mirror staleness
    pub fn oldest_age_secs(&self, now: DateTime<Utc>) -> f64 {
        self.oldest_created_at
            .map(|created| (now - created).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

#[async_trait]
pub trait SyncOutbox: Send + Sync {
    async fn enqueue(&self, intent: &SyncIntent) -> Result<(), RepoError>;

    /// Intents whose `next_attempt_at` is not after `now`, oldest first
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SyncIntent>, RepoError>;

    async fn complete(&self, id: Uuid) -> Result<(), RepoError>;

    /// Store updated attempt bookkeeping for an intent
    async fn reschedule(&self, intent: &SyncIntent) -> Result<(), RepoError>;

    /// Move an intent out of the outbox into the dead-letter table
    async fn dead_letter(&self, intent: &SyncIntent, error: &str) -> Result<(), RepoError>;

    async fn backlog(&self) -> Result<OutboxBacklog, RepoError>;

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, RepoError>;
}
