use uuid::Uuid;

use super::value_objects::OrderStatus;
use crate::store::RepoError;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("No variant of '{slug}' matches size '{size}' and color '{color}'")]
    VariantNotFound { slug: String, size: String, color: String },

    #[error("Insufficient stock for '{slug}' ({size}/{color}): requested {requested}, available {available}")]
    InsufficientStock {
        slug: String,
        size: String,
        color: String,
        requested: u32,
        available: u32,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order {0} was modified concurrently, retry the request")]
    ConcurrentModification(Uuid),

    #[error("Storage error: {0}")]
    Repository(#[from] RepoError),
}

impl OrderError {
    pub fn order_not_found(id: Uuid) -> Self {
        OrderError::NotFound { entity: "Order", key: id.to_string() }
    }

    pub fn catalog_not_found(key: impl Into<String>) -> Self {
        OrderError::NotFound { entity: "Catalog entry", key: key.into() }
    }

    /// Errors caused by the request rather than by the system (4xx)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, OrderError::Repository(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_mapping() {
        assert!(OrderError::Validation("empty cart".into()).is_client_error());
        assert!(OrderError::order_not_found(Uuid::new_v4()).is_client_error());
        assert!(OrderError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Pending,
        }
        .is_client_error());
        assert!(!OrderError::Repository(RepoError::Backend("timeout".into())).is_client_error());
    }

    #[test]
    fn test_insufficient_stock_message() {
        let err = OrderError::InsufficientStock {
            slug: "linen-shirt".into(),
            size: "M".into(),
            color: "Red".into(),
            requested: 11,
            available: 10,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for 'linen-shirt' (M/Red): requested 11, available 10"
        );
    }
}
