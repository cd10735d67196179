use std::sync::Arc;

use uuid::Uuid;

use crate::domain::catalog::CatalogEntry;
use crate::domain::order::OrderError;
use crate::metrics::Metrics;
use crate::store::{CatalogRepository, RepoError};
use crate::utils::{retry_on_transient, IsTransient, RetryConfig};

// ============================================================================
// Stock Ledger - version-checked, idempotent variant stock mutations
// ============================================================================
//
// Every mutation is a read-check-write cycle on one catalog entry:
//   1. re-fetch the entry (never trust a cached copy)
//   2. skip if the op id is already journaled on the entry
//   3. check and apply the delta, recompute aggregate stock
//   4. journal the op id, compare-and-set on the entry version
//
// Journaled ids stay on the entry until the order intent that owns them is
// cleared, then `release` drops them. Replay detection and the compensation
// gate therefore never depend on how busy the entry is.
//
// A lost race surfaces as RepoError::Conflict and the whole cycle is retried,
// so two confirmations against the same variant can never both pass the
// stock check on the same snapshot.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDelta {
    Deduct(u32),
    Restore(u32),
}

impl StockDelta {
    pub fn label(&self) -> &'static str {
        match self {
            StockDelta::Deduct(_) => "deduct",
            StockDelta::Restore(_) => "restore",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StockMutation {
    /// Journal id; applying the same id twice changes nothing
    pub op_id: String,
    pub catalog_id: Uuid,
    pub slug: String,
    pub size: String,
    pub color: String,
    pub delta: StockDelta,
    /// Apply only if this op id is already journaled (compensations)
    pub requires_op: Option<String>,
}

/// State of the entry after a mutation attempt
#[derive(Debug, Clone, PartialEq)]
pub struct StockApplied {
    pub catalog_id: Uuid,
    pub aggregate_stock: i64,
    pub rating: Option<f64>,
    pub version: i64,
    /// False when the op was already applied or its prerequisite is missing
    pub changed: bool,
}

impl StockApplied {
    fn from_entry(entry: &CatalogEntry, changed: bool) -> Self {
        Self {
            catalog_id: entry.id,
            aggregate_stock: entry.aggregate_stock,
            rating: entry.rating,
            version: entry.version,
            changed,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StockError {
    #[error("Catalog entry {0} no longer exists")]
    EntryNotFound(Uuid),

    #[error("Variant {size}/{color} of '{slug}' no longer exists")]
    VariantNotFound { slug: String, size: String, color: String },

    #[error("Insufficient stock for '{slug}' ({size}/{color}): requested {requested}, available {available}")]
    Insufficient {
        slug: String,
        size: String,
        color: String,
        requested: u32,
        available: u32,
    },

    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl StockError {
    /// The targeted entry or variant is gone
    pub fn is_missing_target(&self) -> bool {
        matches!(self, StockError::EntryNotFound(_) | StockError::VariantNotFound { .. })
    }
}

impl IsTransient for StockError {
    fn is_transient(&self) -> bool {
        matches!(self, StockError::Repository(e) if e.is_conflict())
    }
}

impl From<StockError> for OrderError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::EntryNotFound(id) => OrderError::catalog_not_found(id.to_string()),
            StockError::VariantNotFound { slug, size, color } => {
                OrderError::VariantNotFound { slug, size, color }
            }
            StockError::Insufficient { slug, size, color, requested, available } => {
                OrderError::InsufficientStock { slug, size, color, requested, available }
            }
            StockError::Repository(e) => OrderError::Repository(e),
        }
    }
}

pub struct StockLedger {
    catalog: Arc<dyn CatalogRepository>,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl StockLedger {
    pub fn new(catalog: Arc<dyn CatalogRepository>, metrics: Arc<Metrics>) -> Self {
        Self {
            catalog,
            retry: RetryConfig::for_conflicts(),
            metrics,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Apply one mutation, retrying version conflicts with backoff
    pub async fn apply(&self, mutation: &StockMutation) -> Result<StockApplied, StockError> {
        let result = retry_on_transient(&self.retry, |attempt| async move {
            if attempt > 1 {
                self.metrics.stock_conflicts.inc();
            }
            self.try_apply(mutation).await
        })
        .await
        .into_result();

        let outcome = match &result {
            Ok(applied) if applied.changed => "applied",
            Ok(_) => "skipped",
            Err(StockError::Insufficient { .. }) => "insufficient",
            Err(e) if e.is_missing_target() => "missing",
            Err(_) => "failed",
        };
        self.metrics.record_stock_mutation(mutation.delta.label(), outcome);

        result
    }

    /// Drop the journaled ids of a resolved intent from one entry. A missing
    /// entry has nothing left to release.
    pub async fn release(&self, catalog_id: Uuid, op_prefix: &str) -> Result<usize, StockError> {
        retry_on_transient(&self.retry, |_| self.try_release(catalog_id, op_prefix))
            .await
            .into_result()
    }

    async fn try_release(&self, catalog_id: Uuid, op_prefix: &str) -> Result<usize, StockError> {
        let Some(mut entry) = self.catalog.find_by_id(catalog_id).await? else {
            return Ok(0);
        };

        let released = entry.release_ops(op_prefix);
        if released == 0 {
            return Ok(0);
        }

        let expected_version = entry.version;
        entry.version += 1;
        self.catalog.save(&entry, expected_version).await?;

        tracing::debug!(catalog_id = %catalog_id, op_prefix, released, "Stock journal released");
        Ok(released)
    }

    async fn try_apply(&self, mutation: &StockMutation) -> Result<StockApplied, StockError> {
        let mut entry = self
            .catalog
            .find_by_id(mutation.catalog_id)
            .await?
            .ok_or(StockError::EntryNotFound(mutation.catalog_id))?;

        if entry.has_applied(&mutation.op_id) {
            tracing::debug!(op_id = %mutation.op_id, catalog_id = %entry.id, "Stock op already applied");
            return Ok(StockApplied::from_entry(&entry, false));
        }

        if let Some(required) = &mutation.requires_op {
            if !entry.has_applied(required) {
                tracing::debug!(op_id = %mutation.op_id, required = %required, "Nothing to compensate");
                return Ok(StockApplied::from_entry(&entry, false));
            }
        }

        let variant = entry
            .find_variant_mut(&mutation.size, &mutation.color)
            .ok_or_else(|| StockError::VariantNotFound {
                slug: mutation.slug.clone(),
                size: mutation.size.clone(),
                color: mutation.color.clone(),
            })?;

        match mutation.delta {
            StockDelta::Deduct(quantity) => {
                if variant.stock < quantity {
                    return Err(StockError::Insufficient {
                        slug: mutation.slug.clone(),
                        size: mutation.size.clone(),
                        color: mutation.color.clone(),
                        requested: quantity,
                        available: variant.stock,
                    });
                }
                variant.stock -= quantity;
            }
            StockDelta::Restore(quantity) => {
                variant.stock = variant.stock.saturating_add(quantity);
            }
        }

        entry.recompute_aggregate_stock();
        entry.record_op(mutation.op_id.clone());

        let expected_version = entry.version;
        entry.version += 1;
        self.catalog.save(&entry, expected_version).await?;

        tracing::debug!(
            op_id = %mutation.op_id,
            catalog_id = %entry.id,
            delta = ?mutation.delta,
            aggregate_stock = entry.aggregate_stock,
            version = entry.version,
            "Stock mutation applied"
        );

        Ok(StockApplied::from_entry(&entry, true))
    }
}
