// ============================================================================
// Index Mirror - read-optimized projection of catalog stock/rating
// ============================================================================
//
// Search and browse paths read stock and rating from here instead of the
// catalog store. Every update carries the catalog entry version it was read
// from; a mirror never replaces newer data with older data, which keeps
// replayed or reordered updates harmless.
//
// ============================================================================

mod memory;
mod redis;

pub use memory::InMemoryIndexMirror;
pub use self::redis::RedisIndexMirror;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::CircuitState;

/// Partial update: absent fields are left untouched
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFields {
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub rating: Option<f64>,
}

impl IndexFields {
    pub fn stock(stock: i64) -> Self {
        Self { stock: Some(stock), rating: None }
    }

    pub fn rating(rating: f64) -> Self {
        Self { stock: None, rating: Some(rating) }
    }

    pub fn is_empty(&self) -> bool {
        self.stock.is_none() && self.rating.is_none()
    }

    /// Same field selection with freshly read values
    pub fn refreshed_from(&self, stock: i64, rating: Option<f64>) -> Self {
        Self {
            stock: self.stock.map(|_| stock),
            rating: self.rating.and(rating),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub catalog_id: Uuid,
    pub stock: Option<i64>,
    pub rating: Option<f64>,
    /// Catalog entry version the document reflects
    pub version: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Index mirror unavailable: circuit open")]
    Unavailable,

    #[error("Index mirror backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait IndexMirror: Send + Sync {
    /// Apply `fields` unless the mirror already holds a newer version.
    /// Applying the same update twice leaves the same state as once.
    async fn upsert_partial(&self, catalog_id: Uuid, fields: IndexFields, version: i64) -> Result<(), MirrorError>;

    async fn get(&self, catalog_id: Uuid) -> Result<Option<IndexDocument>, MirrorError>;

    /// Breaker state for mirrors that sit behind one
    async fn circuit_state(&self) -> Option<CircuitState> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refreshed_fields_keep_selection() {
        let stock_only = IndexFields::stock(7);
        assert_eq!(stock_only.refreshed_from(3, Some(4.5)), IndexFields::stock(3));

        let rating_only = IndexFields::rating(4.0);
        assert_eq!(rating_only.refreshed_from(3, Some(4.5)), IndexFields::rating(4.5));
        assert!(IndexFields::default().is_empty());
    }
}
