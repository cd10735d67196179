#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use fulfillment_core::domain::catalog::{CatalogEntry, Variant};
use fulfillment_core::domain::order::{
    CheckoutRequest, OrderService, RequestedItem, Shipment, TransitionPolicy,
};
use fulfillment_core::metrics::Metrics;
use fulfillment_core::mirror::InMemoryIndexMirror;
use fulfillment_core::store::memory::{InMemoryCatalog, InMemoryOrders, InMemoryOutbox};
use fulfillment_core::store::CatalogRepository;
use fulfillment_core::sync::{IndexSynchronizer, OutboxRelay, RelayConfig};
use fulfillment_core::utils::RetryConfig;

pub struct Harness {
    pub catalog: Arc<InMemoryCatalog>,
    pub orders: Arc<InMemoryOrders>,
    pub outbox: Arc<InMemoryOutbox>,
    pub mirror: Arc<InMemoryIndexMirror>,
    pub metrics: Arc<Metrics>,
    pub service: Arc<OrderService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(TransitionPolicy::Strict)
    }

    pub fn with_policy(policy: TransitionPolicy) -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let orders = Arc::new(InMemoryOrders::new());
        let outbox = Arc::new(InMemoryOutbox::new());
        let mirror = Arc::new(InMemoryIndexMirror::new());
        let metrics = Arc::new(Metrics::new().unwrap());

        let synchronizer = Arc::new(IndexSynchronizer::new(mirror.clone(), outbox.clone(), metrics.clone()));
        let service = OrderService::new(orders.clone(), catalog.clone(), synchronizer, metrics.clone())
            .with_policy(policy)
            .with_conflict_retry(RetryConfig {
                max_attempts: 50,
                initial_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(5),
                multiplier: 1.5,
            });

        Self {
            catalog,
            orders,
            outbox,
            mirror,
            metrics,
            service: Arc::new(service),
        }
    }

    pub fn relay(&self, max_attempts: u32) -> OutboxRelay {
        OutboxRelay::new(
            self.outbox.clone(),
            self.catalog.clone(),
            self.mirror.clone(),
            self.metrics.clone(),
            RelayConfig {
                max_attempts,
                ..RelayConfig::default()
            },
        )
    }

    pub async fn seed(&self, entry: &CatalogEntry) {
        self.catalog.insert(entry).await.unwrap();
    }

    pub async fn variant_stock(&self, catalog_id: Uuid, size: &str, color: &str) -> u32 {
        self.catalog
            .find_by_id(catalog_id)
            .await
            .unwrap()
            .unwrap()
            .find_variant(size, color)
            .unwrap()
            .stock
    }
}

pub fn shipment() -> Shipment {
    Shipment {
        recipient_name: "Asha Rao".to_string(),
        phone: "+91 98450 00000".to_string(),
        address_line: "12 Hill Road".to_string(),
        city: "Bengaluru".to_string(),
        postal_code: "560001".to_string(),
        country: "IN".to_string(),
        email: Some("asha@example.com".to_string()),
    }
}

pub fn checkout(items: Vec<RequestedItem>) -> CheckoutRequest {
    CheckoutRequest {
        items,
        shipment: shipment(),
        user_id: None,
    }
}

/// Vendor A shirt: M/Red at 500 (discounted to 450), stock 10
pub fn shirt() -> CatalogEntry {
    let mut entry = CatalogEntry::new(
        "linen-shirt",
        "Linen Shirt",
        Some("vendor-a".to_string()),
        vec![
            Variant::new("M", "Red", Decimal::from(500), 10).with_discount(Decimal::from(450)),
            Variant::new("L", "Blue", Decimal::from(500), 3),
        ],
    );
    entry.vendor_name = Some("Vendor A".to_string());
    entry
}

/// Vendor B mug at 200, stock 5
pub fn mug() -> CatalogEntry {
    let mut entry = CatalogEntry::new(
        "stoneware-mug",
        "Stoneware Mug",
        Some("vendor-b".to_string()),
        vec![Variant::new("Standard", "White", Decimal::from(200), 5)],
    );
    entry.vendor_name = Some("Vendor B".to_string());
    entry
}

/// Platform-owned tote at 300, stock 8
pub fn tote() -> CatalogEntry {
    CatalogEntry::new(
        "canvas-tote",
        "Canvas Tote",
        None,
        vec![Variant::new("One Size", "Natural", Decimal::from(300), 8)],
    )
}
