use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::{CheckoutRequest, RequestedItem};
use super::errors::OrderError;
use super::order_number::generate_order_number;
use super::pricing::price_line;
use super::value_objects::{Order, OrderLineItem, OrderStatus, VariantSnapshot};
use crate::domain::catalog::CatalogEntry;
use crate::store::CatalogRepository;

// ============================================================================
// Checkout - variant resolution, pricing and vendor grouping
// ============================================================================
//
// Runs entirely before any write:
//   validate request -> resolve every item against live catalog entries ->
//   check stock (summed per variant) -> price -> group by vendor -> build
//   one PENDING order per vendor group
//
// Stock is only checked here, never reserved. Deduction happens when an
// order is confirmed.
//
// ============================================================================

/// Result of a checkout, returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreationResult {
    pub checkout_id: Uuid,
    pub orders: Vec<Order>,
    pub line_items: Vec<OrderLineItem>,
    pub total_order_amount: Decimal,
    pub total_discount: Decimal,
}

impl OrderCreationResult {
    pub fn from_orders(checkout_id: Uuid, orders: Vec<Order>) -> Self {
        let line_items: Vec<OrderLineItem> = orders
            .iter()
            .flat_map(|order| order.line_items.iter().cloned())
            .collect();

        Self {
            checkout_id,
            total_order_amount: orders.iter().map(|o| o.order_total).sum(),
            total_discount: orders.iter().map(|o| o.total_discount).sum(),
            orders,
            line_items,
        }
    }
}

/// Line items of one vendor, in the order they were first requested
#[derive(Debug, Clone)]
pub struct VendorGroup {
    pub vendor_id: String,
    pub lines: Vec<OrderLineItem>,
}

pub fn validate_request(request: &CheckoutRequest) -> Result<(), OrderError> {
    if request.items.is_empty() {
        return Err(OrderError::Validation("checkout has no items".to_string()));
    }

    for (index, item) in request.items.iter().enumerate() {
        if item.slug.trim().is_empty() || item.size.trim().is_empty() || item.color.trim().is_empty() {
            return Err(OrderError::Validation(format!(
                "item {} needs a slug, size and color",
                index
            )));
        }
        if item.quantity == 0 {
            return Err(OrderError::Validation(format!(
                "item {} ('{}') has quantity 0",
                index, item.slug
            )));
        }
    }

    let blank = request.shipment.blank_fields();
    if !blank.is_empty() {
        return Err(OrderError::Validation(format!(
            "shipment fields are blank: {}",
            blank.join(", ")
        )));
    }

    Ok(())
}

/// Resolve every requested item to a priced line item.
///
/// Entries are read once per slug. Repeated requests for the same variant
/// are checked against their summed quantity, so a cart cannot pass the
/// stock check by splitting one variant over several lines.
pub async fn resolve_items(
    catalog: &dyn CatalogRepository,
    items: &[RequestedItem],
) -> Result<Vec<OrderLineItem>, OrderError> {
    let mut entries: HashMap<String, CatalogEntry> = HashMap::new();
    let mut requested: HashMap<(Uuid, usize), u32> = HashMap::new();
    let mut lines = Vec::with_capacity(items.len());

    for item in items {
        let slug = item.slug.trim();
        if !entries.contains_key(slug) {
            let entry = catalog
                .find_by_slug(slug)
                .await?
                .ok_or_else(|| OrderError::catalog_not_found(slug))?;
            entries.insert(slug.to_string(), entry);
        }
        let entry = entries
            .get(slug)
            .ok_or_else(|| OrderError::catalog_not_found(slug))?;

        let (variant_index, variant) = entry
            .variants
            .iter()
            .enumerate()
            .find(|(_, v)| v.matches(&item.size, &item.color))
            .ok_or_else(|| OrderError::VariantNotFound {
                slug: entry.slug.clone(),
                size: item.size.clone(),
                color: item.color.clone(),
            })?;

        let total_requested = requested.entry((entry.id, variant_index)).or_insert(0);
        *total_requested = total_requested.saturating_add(item.quantity);
        if *total_requested > variant.stock {
            return Err(OrderError::InsufficientStock {
                slug: entry.slug.clone(),
                size: variant.size.clone(),
                color: variant.color.clone(),
                requested: *total_requested,
                available: variant.stock,
            });
        }

        let pricing = price_line(variant, item.quantity);
        lines.push(OrderLineItem {
            catalog_id: entry.id,
            slug: entry.slug.clone(),
            name: entry.name.clone(),
            quantity: item.quantity,
            variant: VariantSnapshot {
                size: variant.size.clone(),
                color: variant.color.clone(),
                price: variant.price,
                discount_price: variant.discount_price,
            },
            unit_price: pricing.unit_price,
            total_price: pricing.total_price,
            line_discount: pricing.line_discount,
            vendor_id: entry.vendor_key().to_string(),
            vendor_name: entry.vendor_name.clone(),
        });
    }

    Ok(lines)
}

/// Partition lines by vendor, keeping first-seen vendor order
pub fn group_by_vendor(lines: Vec<OrderLineItem>) -> Vec<VendorGroup> {
    let mut groups: Vec<VendorGroup> = Vec::new();

    for line in lines {
        match groups.iter_mut().find(|g| g.vendor_id == line.vendor_id) {
            Some(group) => group.lines.push(line),
            None => groups.push(VendorGroup {
                vendor_id: line.vendor_id.clone(),
                lines: vec![line],
            }),
        }
    }

    groups
}

/// One PENDING order per vendor group, all sharing checkout id and shipment
pub fn build_orders(
    groups: Vec<VendorGroup>,
    request: &CheckoutRequest,
    checkout_id: Uuid,
    now: DateTime<Utc>,
) -> Vec<Order> {
    groups
        .into_iter()
        .map(|group| {
            let order_total = group.lines.iter().map(|l| l.total_price).sum();
            let total_discount = group.lines.iter().map(|l| l.line_discount).sum();

            Order {
                id: Uuid::now_v7(),
                order_number: generate_order_number(now),
                checkout_id,
                user_id: request.user_id,
                is_admin: Order::is_admin_vendor(&group.vendor_id),
                vendor_id: group.vendor_id,
                line_items: group.lines,
                shipment: request.shipment.clone(),
                status: OrderStatus::Pending,
                order_total,
                total_discount,
                stock_deducted: false,
                pending_stock_op: None,
                version: 0,
                created_at: now,
                updated_at: now,
            }
        })
        .collect()
}
