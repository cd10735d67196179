use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::Shipment;

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

/// One requested cart line, as sent by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedItem {
    pub slug: String,
    pub size: String,
    pub color: String,
    pub quantity: u32,
}

impl RequestedItem {
    pub fn new(slug: impl Into<String>, size: impl Into<String>, color: impl Into<String>, quantity: u32) -> Self {
        Self {
            slug: slug.into(),
            size: size.into(),
            color: color.into(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<RequestedItem>,
    pub shipment: Shipment,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}
