use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::ADMIN_VENDOR;

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Shipped or delivered orders count as fulfilled revenue
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Delivered)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

/// Variant fields frozen at order creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSnapshot {
    pub size: String,
    pub color: String,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineItem {
    pub catalog_id: Uuid,
    pub slug: String,
    pub name: String,
    pub quantity: u32,
    pub variant: VariantSnapshot,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub line_discount: Decimal,
    pub vendor_id: String,
    pub vendor_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub recipient_name: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Shipment {
    /// Names of required fields that are blank
    pub fn blank_fields(&self) -> Vec<&'static str> {
        [
            ("recipientName", &self.recipient_name),
            ("phone", &self.phone),
            ("addressLine", &self.address_line),
            ("city", &self.city),
            ("postalCode", &self.postal_code),
            ("country", &self.country),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockOpKind {
    Deduct,
    Restore,
}

/// Stock mutation in flight for an order; present only between the intent
/// write and the final status write of a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingStockOp {
    pub op_id: Uuid,
    pub kind: StockOpKind,
    pub target_status: OrderStatus,
    pub started_at: DateTime<Utc>,
}

impl PendingStockOp {
    pub fn new(kind: StockOpKind, target_status: OrderStatus) -> Self {
        Self {
            op_id: Uuid::new_v4(),
            kind,
            target_status,
            started_at: Utc::now(),
        }
    }

    /// Shared prefix of every journal id this intent writes
    pub fn journal_prefix(&self) -> String {
        format!("{}:", self.op_id)
    }

    /// Journal id of the forward mutation for one line
    pub fn line_op(&self, line_index: usize) -> String {
        format!("{}:{}", self.op_id, line_index)
    }

    /// Journal id of the compensation for one line
    pub fn undo_op(&self, line_index: usize) -> String {
        format!("{}:{}:undo", self.op_id, line_index)
    }
}

/// Vendor-scoped purchase and its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    /// Shared by all orders produced from one checkout
    pub checkout_id: Uuid,
    pub user_id: Option<Uuid>,
    pub vendor_id: String,
    pub is_admin: bool,
    pub line_items: Vec<OrderLineItem>,
    pub shipment: Shipment,
    pub status: OrderStatus,
    pub order_total: Decimal,
    pub total_discount: Decimal,
    /// True while this order's quantities are subtracted from catalog stock
    #[serde(default)]
    pub stock_deducted: bool,
    #[serde(default)]
    pub pending_stock_op: Option<PendingStockOp>,
    #[serde(default)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_admin_vendor(vendor_id: &str) -> bool {
        vendor_id == ADMIN_VENDOR
    }

    /// Persisted total, or the line sum when the stored value is zero
    pub fn effective_total(&self) -> Decimal {
        if self.order_total > Decimal::ZERO {
            self.order_total
        } else {
            self.line_items.iter().map(|line| line.total_price).sum()
        }
    }

    pub fn has_vendor(&self, vendor_id: &str) -> bool {
        self.vendor_id == vendor_id || self.line_items.iter().any(|line| line.vendor_id == vendor_id)
    }
}
