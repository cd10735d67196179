use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fulfillment_core::config::{AppConfig, StorageBackend};
use fulfillment_core::dashboard::{DashboardScope, SalesDashboard, TimeRange};
use fulfillment_core::domain::catalog::{CatalogEntry, Variant};
use fulfillment_core::domain::order::{CheckoutRequest, OrderService, OrderStatus, RequestedItem, Shipment};
use fulfillment_core::metrics::{self, Metrics};
use fulfillment_core::mirror::{InMemoryIndexMirror, IndexMirror, RedisIndexMirror};
use fulfillment_core::store::memory::{InMemoryCatalog, InMemoryOrders, InMemoryOutbox};
use fulfillment_core::store::scylla::{self as scylla_store, ScyllaCatalog, ScyllaOrders, ScyllaOutbox};
use fulfillment_core::store::{CatalogRepository, OrderRepository, RepoError, SyncOutbox};
use fulfillment_core::sync::{IndexSynchronizer, OutboxRelay};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fulfillment_core=debug"))
        )
        .init();

    tracing::info!("🚀 Starting fulfillment core");

    let config = AppConfig::from_env()?;
    tracing::info!(
        storage = ?config.storage_backend,
        timezone = %config.business_timezone,
        policy = ?config.transition_policy,
        "Configuration loaded"
    );

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let metrics_for_server = metrics.clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("Metrics runtime error: {}", e);
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(metrics_for_server, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 2. Stores ===
    let (catalog, orders, outbox): (Arc<dyn CatalogRepository>, Arc<dyn OrderRepository>, Arc<dyn SyncOutbox>) =
        match config.storage_backend {
            StorageBackend::Memory => {
                tracing::info!("Using in-memory stores");
                (
                    Arc::new(InMemoryCatalog::new()),
                    Arc::new(InMemoryOrders::new()),
                    Arc::new(InMemoryOutbox::new()),
                )
            }
            StorageBackend::Scylla => {
                let session = scylla_store::connect(&config.scylla_nodes, &config.scylla_keyspace).await?;
                (
                    Arc::new(ScyllaCatalog::new(session.clone())),
                    Arc::new(ScyllaOrders::new(session.clone())),
                    Arc::new(ScyllaOutbox::new(session)),
                )
            }
        };

    // === 3. Index mirror ===
    let mirror: Arc<dyn IndexMirror> = match &config.redis_url {
        Some(url) => Arc::new(RedisIndexMirror::connect(url).await?),
        None => {
            tracing::info!("REDIS_URL not set, using in-memory index mirror");
            Arc::new(InMemoryIndexMirror::new())
        }
    };

    // === 4. Services ===
    let synchronizer = Arc::new(IndexSynchronizer::new(mirror.clone(), outbox.clone(), metrics.clone()));
    let service = OrderService::new(orders.clone(), catalog.clone(), synchronizer, metrics.clone())
        .with_policy(config.transition_policy);
    let dashboard = SalesDashboard::new(orders.clone(), config.business_timezone);

    let report = service.recover_pending_stock_ops().await?;
    tracing::info!(
        rolled_back = report.rolled_back,
        rolled_forward = report.rolled_forward,
        failed = report.failed,
        "Startup recovery finished"
    );

    // === 5. Outbox relay ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = Arc::new(OutboxRelay::new(outbox, catalog.clone(), mirror, metrics.clone(), config.relay.clone()));
    let relay_handle = relay.spawn(shutdown_rx);

    // === 6. Demo flow ===
    if let Err(e) = run_demo(catalog.as_ref(), &service, &dashboard).await {
        tracing::error!(error = %e, "Demo flow failed");
    }

    tracing::info!("✅ Fulfillment core running. Metrics on :{}/metrics", config.metrics_port);
    tracing::info!("Press Ctrl+C to exit.");

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutdown signal received");

    shutdown_tx.send(true).ok();
    relay_handle.await.ok();

    tracing::info!("👋 Shutdown complete");
    Ok(())
}

/// Seed two vendors' products, check out across both, confirm one order,
/// cancel it, and print today's dashboard
async fn run_demo(
    catalog: &dyn CatalogRepository,
    service: &OrderService,
    dashboard: &SalesDashboard,
) -> anyhow::Result<()> {
    seed_catalog(catalog).await?;

    let request = CheckoutRequest {
        items: vec![
            RequestedItem::new("linen-shirt", "M", "Red", 2),
            RequestedItem::new("canvas-tote", "One Size", "Natural", 1),
        ],
        shipment: Shipment {
            recipient_name: "Asha Rao".to_string(),
            phone: "+91 98450 00000".to_string(),
            address_line: "12 Hill Road".to_string(),
            city: "Bengaluru".to_string(),
            postal_code: "560001".to_string(),
            country: "IN".to_string(),
            email: None,
        },
        user_id: None,
    };

    let created = service.create_order(request).await?;
    tracing::info!(
        checkout_id = %created.checkout_id,
        orders = created.orders.len(),
        total = %created.total_order_amount,
        discount = %created.total_discount,
        "🛒 Checkout complete"
    );

    if let Some(order) = created.orders.first() {
        service.transition_status(order.id, OrderStatus::Confirmed).await?;
        let cancelled = service.transition_status(order.id, OrderStatus::Cancelled).await?;
        tracing::info!(
            order_number = %cancelled.order.order_number,
            skipped_restorations = cancelled.skipped_restorations.len(),
            "Demo order confirmed and cancelled"
        );
    }

    let report = dashboard
        .get_dashboard(TimeRange::Today, &DashboardScope::Platform { include_all_vendors: true })
        .await?;
    tracing::info!("📈 Today's dashboard:\n{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

async fn seed_catalog(catalog: &dyn CatalogRepository) -> anyhow::Result<()> {
    let mut shirt = CatalogEntry::new(
        "linen-shirt",
        "Linen Shirt",
        Some("vendor-a".to_string()),
        vec![
            Variant::new("M", "Red", Decimal::from(1200), 10).with_discount(Decimal::from(999)),
            Variant::new("L", "Red", Decimal::from(1200), 4),
        ],
    );
    shirt.vendor_name = Some("Vendor A".to_string());

    let tote = CatalogEntry::new(
        "canvas-tote",
        "Canvas Tote",
        None,
        vec![Variant::new("One Size", "Natural", Decimal::from(450), 25)],
    );

    for entry in [shirt, tote] {
        match catalog.insert(&entry).await {
            Ok(()) => tracing::info!(slug = %entry.slug, stock = entry.aggregate_stock, "Seeded catalog entry"),
            Err(RepoError::Duplicate { .. }) => tracing::debug!(slug = %entry.slug, "Catalog entry already seeded"),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
