mod common;

use std::sync::Arc;

use rust_decimal::Decimal;

use common::{checkout, mug, shirt, tote, Harness};
use fulfillment_core::domain::inventory::{StockDelta, StockLedger, StockMutation};
use fulfillment_core::domain::order::{
    OrderError, OrderStatus, PendingStockOp, RequestedItem, StockOpKind, TransitionPolicy,
};
use fulfillment_core::mirror::IndexMirror;
use fulfillment_core::store::{CatalogRepository, OrderRepository, SyncOutbox};

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
async fn test_confirm_deducts_stock() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let created = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 3)]))
        .await
        .unwrap();
    let order = &created.orders[0];
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.line_items[0].total_price, Decimal::from(1350));
    assert_eq!(order.line_items[0].line_discount, Decimal::from(150));

    // Creation alone never touches stock
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);

    let outcome = h.service.transition_status(order.id, OrderStatus::Confirmed).await.unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Confirmed);
    assert!(outcome.order.stock_deducted);
    assert!(outcome.order.pending_stock_op.is_none());
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 7);

    let indexed = h.mirror.get(entry.id).await.unwrap().unwrap();
    assert_eq!(indexed.stock, Some(10));
}

#[tokio::test]
async fn test_full_price_line_total() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let created = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "l", " blue ", 3)]))
        .await
        .unwrap();

    let line = &created.orders[0].line_items[0];
    assert_eq!(line.variant.size, "L");
    assert_eq!(line.unit_price, Decimal::from(500));
    assert_eq!(line.total_price, Decimal::from(1500));
    assert_eq!(created.total_order_amount, Decimal::from(1500));
}

#[tokio::test]
async fn test_checkout_rejects_quantity_above_stock() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let err = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 11)]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderError::InsufficientStock { requested: 11, available: 10, .. }
    ));
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);
    assert!(h.orders.scan(&Default::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_splits_by_vendor() {
    let h = Harness::new();
    let (a, b, platform) = (shirt(), mug(), tote());
    h.seed(&a).await;
    h.seed(&b).await;
    h.seed(&platform).await;

    let created = h
        .service
        .create_order(checkout(vec![
            RequestedItem::new("linen-shirt", "M", "Red", 2),
            RequestedItem::new("stoneware-mug", "Standard", "White", 3),
            RequestedItem::new("linen-shirt", "L", "Blue", 1),
            RequestedItem::new("canvas-tote", "One Size", "Natural", 1),
        ]))
        .await
        .unwrap();

    assert_eq!(created.orders.len(), 3);
    assert_eq!(created.line_items.len(), 4);

    let vendor_a = created.orders.iter().find(|o| o.vendor_id == "vendor-a").unwrap();
    assert_eq!(vendor_a.line_items.len(), 2);
    assert!(vendor_a.line_items.iter().all(|l| l.vendor_id == "vendor-a"));
    assert_eq!(vendor_a.order_total, Decimal::from(900 + 500));
    assert_eq!(vendor_a.total_discount, Decimal::from(100));
    assert!(!vendor_a.is_admin);

    let vendor_b = created.orders.iter().find(|o| o.vendor_id == "vendor-b").unwrap();
    assert_eq!(vendor_b.line_items.len(), 1);
    assert_eq!(vendor_b.order_total, Decimal::from(600));

    let admin = created.orders.iter().find(|o| o.is_admin).unwrap();
    assert_eq!(admin.vendor_id, "admin");
    assert_eq!(admin.order_total, Decimal::from(300));

    assert!(created.orders.iter().all(|o| o.checkout_id == created.checkout_id));
    assert_eq!(created.total_order_amount, Decimal::from(1400 + 600 + 300));
    assert_eq!(created.total_discount, Decimal::from(100));

    let mut numbers: Vec<_> = created.orders.iter().map(|o| o.order_number.clone()).collect();
    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), 3);
}

#[tokio::test]
async fn test_checkout_rejects_unknown_variant() {
    let h = Harness::new();
    h.seed(&shirt()).await;

    let err = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "XXL", "Red", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::VariantNotFound { .. }));

    let err = h
        .service
        .create_order(checkout(vec![RequestedItem::new("missing-product", "M", "Red", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::NotFound { .. }));
}

// ============================================================================
// Confirmation and cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_confirmed_order_restores_stock() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let created = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 3)]))
        .await
        .unwrap();
    let order_id = created.orders[0].id;

    h.service.transition_status(order_id, OrderStatus::Confirmed).await.unwrap();
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 7);

    let outcome = h.service.transition_status(order_id, OrderStatus::Cancelled).await.unwrap();

    assert_eq!(outcome.previous_status, OrderStatus::Confirmed);
    assert!(!outcome.order.stock_deducted);
    assert!(outcome.skipped_restorations.is_empty());
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);

    let stored = h.orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert!(stored.pending_stock_op.is_none());
}

#[tokio::test]
async fn test_cancel_pending_order_leaves_stock() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let created = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 3)]))
        .await
        .unwrap();

    h.service.transition_status(created.orders[0].id, OrderStatus::Cancelled).await.unwrap();
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);
}

#[tokio::test]
async fn test_confirm_fails_when_stock_ran_out() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    // Both pass the checkout check; only one can be confirmed
    let first = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 6)]))
        .await
        .unwrap();
    let second = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 6)]))
        .await
        .unwrap();

    h.service.transition_status(first.orders[0].id, OrderStatus::Confirmed).await.unwrap();
    let err = h
        .service
        .transition_status(second.orders[0].id, OrderStatus::Confirmed)
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::InsufficientStock { requested: 6, available: 4, .. }));
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 4);

    let stored = h.orders.find_by_id(second.orders[0].id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(!stored.stock_deducted);
    assert!(stored.pending_stock_op.is_none());
}

#[tokio::test]
async fn test_failed_line_compensates_earlier_lines() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let order = h
        .service
        .create_order(checkout(vec![
            RequestedItem::new("linen-shirt", "M", "Red", 4),
            RequestedItem::new("linen-shirt", "L", "Blue", 3),
        ]))
        .await
        .unwrap()
        .orders
        .remove(0);

    // Another order takes part of the second line's stock first
    let rival = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "L", "Blue", 2)]))
        .await
        .unwrap();
    h.service.transition_status(rival.orders[0].id, OrderStatus::Confirmed).await.unwrap();

    let err = h.service.transition_status(order.id, OrderStatus::Confirmed).await.unwrap_err();
    assert!(matches!(err, OrderError::InsufficientStock { .. }));

    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);
    assert_eq!(h.variant_stock(entry.id, "L", "Blue").await, 1);

    let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(stored.pending_stock_op.is_none());
    assert_eq!(h.metrics.stock_compensations.get(), 1);
}

#[tokio::test]
async fn test_repeated_cancel_restores_once() {
    let h = Harness::with_policy(TransitionPolicy::Permissive);
    let entry = shirt();
    h.seed(&entry).await;

    let order_id = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 3)]))
        .await
        .unwrap()
        .orders[0]
        .id;

    h.service.transition_status(order_id, OrderStatus::Confirmed).await.unwrap();
    h.service.transition_status(order_id, OrderStatus::Cancelled).await.unwrap();

    let err = h.service.transition_status(order_id, OrderStatus::Cancelled).await.unwrap_err();
    assert!(matches!(err, OrderError::InvalidTransition { .. }));

    // Moving away and back again must not restore a second time
    h.service.transition_status(order_id, OrderStatus::Processing).await.unwrap();
    h.service.transition_status(order_id, OrderStatus::Cancelled).await.unwrap();

    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);
}

#[tokio::test]
async fn test_strict_and_permissive_policies() {
    let strict = Harness::new();
    strict.seed(&shirt()).await;
    let order_id = strict
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 1)]))
        .await
        .unwrap()
        .orders[0]
        .id;

    let err = strict.service.transition_status(order_id, OrderStatus::Shipped).await.unwrap_err();
    assert!(matches!(
        err,
        OrderError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Shipped }
    ));

    let permissive = Harness::with_policy(TransitionPolicy::Permissive);
    let entry = shirt();
    permissive.seed(&entry).await;
    let order_id = permissive
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 1)]))
        .await
        .unwrap()
        .orders[0]
        .id;

    let outcome = permissive.service.transition_status(order_id, OrderStatus::Shipped).await.unwrap();
    assert_eq!(outcome.order.status, OrderStatus::Shipped);
    // Skipping confirmation skips the deduction too
    assert!(!outcome.order.stock_deducted);
    assert_eq!(permissive.variant_stock(entry.id, "M", "Red").await, 10);
}

#[tokio::test]
async fn test_concurrent_confirmations_deduct_once() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let order_id = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 3)]))
        .await
        .unwrap()
        .orders[0]
        .id;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&h.service);
        handles.push(tokio::spawn(async move {
            service.transition_status(order_id, OrderStatus::Confirmed).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(matches!(
                e,
                OrderError::ConcurrentModification(_) | OrderError::InvalidTransition { .. }
            )),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 7);
}

#[tokio::test]
async fn test_competing_orders_never_oversell() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    // Stock 3 on L/Blue, two orders of 2 each
    let mut order_ids = Vec::new();
    for _ in 0..2 {
        let created = h
            .service
            .create_order(checkout(vec![RequestedItem::new("linen-shirt", "L", "Blue", 2)]))
            .await
            .unwrap();
        order_ids.push(created.orders[0].id);
    }

    let handles: Vec<_> = order_ids
        .into_iter()
        .map(|order_id| {
            let service = Arc::clone(&h.service);
            tokio::spawn(async move { service.transition_status(order_id, OrderStatus::Confirmed).await })
        })
        .collect();

    let mut confirmed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => confirmed += 1,
            Err(e) => assert!(matches!(e, OrderError::InsufficientStock { .. })),
        }
    }

    assert_eq!(confirmed, 1);
    assert_eq!(h.variant_stock(entry.id, "L", "Blue").await, 1);
}

#[tokio::test]
async fn test_cancel_skips_missing_variant() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let order_id = h
        .service
        .create_order(checkout(vec![
            RequestedItem::new("linen-shirt", "M", "Red", 2),
            RequestedItem::new("linen-shirt", "L", "Blue", 1),
        ]))
        .await
        .unwrap()
        .orders[0]
        .id;
    h.service.transition_status(order_id, OrderStatus::Confirmed).await.unwrap();

    // The L/Blue variant is discontinued while the order is open
    let mut stored = h.catalog.find_by_id(entry.id).await.unwrap().unwrap();
    stored.variants.retain(|v| v.size != "L");
    let expected = stored.version;
    stored.version += 1;
    h.catalog.save(&stored, expected).await.unwrap();

    let outcome = h.service.transition_status(order_id, OrderStatus::Cancelled).await.unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Cancelled);
    assert_eq!(outcome.skipped_restorations.len(), 1);
    let skipped = &outcome.skipped_restorations[0];
    assert_eq!(skipped.line_index, 1);
    assert_eq!(skipped.size, "L");
    assert_eq!(skipped.quantity, 1);

    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);
    assert_eq!(h.metrics.skipped_restorations.get(), 1);
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test]
async fn test_recovery_rolls_back_interrupted_confirmation() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let mut order = h
        .service
        .create_order(checkout(vec![
            RequestedItem::new("linen-shirt", "M", "Red", 3),
            RequestedItem::new("linen-shirt", "L", "Blue", 2),
        ]))
        .await
        .unwrap()
        .orders
        .remove(0);

    // Simulate a crash after the intent write and the first line's deduction
    let op = PendingStockOp::new(StockOpKind::Deduct, OrderStatus::Confirmed);
    order.pending_stock_op = Some(op.clone());
    order.version += 1;
    h.orders.save(&order, 0).await.unwrap();

    let ledger = StockLedger::new(h.catalog.clone(), h.metrics.clone());
    ledger
        .apply(&StockMutation {
            op_id: op.line_op(0),
            catalog_id: entry.id,
            slug: entry.slug.clone(),
            size: "M".to_string(),
            color: "Red".to_string(),
            delta: StockDelta::Deduct(3),
            requires_op: None,
        })
        .await
        .unwrap();
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 7);

    let report = h.service.recover_pending_stock_ops().await.unwrap();
    assert_eq!(report.rolled_back, 1);
    assert_eq!(report.failed, 0);

    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);
    assert_eq!(h.variant_stock(entry.id, "L", "Blue").await, 3);

    let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(stored.pending_stock_op.is_none());
    assert!(!stored.stock_deducted);

    // A second run finds nothing to do
    let again = h.service.recover_pending_stock_ops().await.unwrap();
    assert_eq!(again.rolled_back + again.rolled_forward + again.failed, 0);
}

#[tokio::test]
async fn test_recovery_completes_interrupted_cancellation() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let order_id = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 4)]))
        .await
        .unwrap()
        .orders[0]
        .id;
    let mut order = h.service.transition_status(order_id, OrderStatus::Confirmed).await.unwrap().order;
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 6);

    // Crash right after the cancellation intent was written
    let expected = order.version;
    order.pending_stock_op = Some(PendingStockOp::new(StockOpKind::Restore, OrderStatus::Cancelled));
    order.version += 1;
    h.orders.save(&order, expected).await.unwrap();

    let report = h.service.recover_pending_stock_ops().await.unwrap();
    assert_eq!(report.rolled_forward, 1);

    let stored = h.orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert!(!stored.stock_deducted);
    assert!(stored.pending_stock_op.is_none());
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);

    // Recovery queues a refresh of every touched catalog entry
    let backlog = h.outbox.backlog().await.unwrap();
    assert_eq!(backlog.pending, 1);
}

/// Run `count` unrelated deduct/restore pairs against L/Blue of `entry`
async fn churn(ledger: &StockLedger, entry: &fulfillment_core::domain::catalog::CatalogEntry, count: usize) {
    for i in 0..count {
        let delta = if i % 2 == 0 { StockDelta::Deduct(1) } else { StockDelta::Restore(1) };
        ledger
            .apply(&StockMutation {
                op_id: format!("churn-{}", i),
                catalog_id: entry.id,
                slug: entry.slug.clone(),
                size: "L".to_string(),
                color: "Blue".to_string(),
                delta,
                requires_op: None,
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_recovery_rollback_survives_busy_entry() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let mut order = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 3)]))
        .await
        .unwrap()
        .orders
        .remove(0);

    let op = PendingStockOp::new(StockOpKind::Deduct, OrderStatus::Confirmed);
    order.pending_stock_op = Some(op.clone());
    order.version += 1;
    h.orders.save(&order, 0).await.unwrap();

    let ledger = StockLedger::new(h.catalog.clone(), h.metrics.clone());
    ledger
        .apply(&StockMutation {
            op_id: op.line_op(0),
            catalog_id: entry.id,
            slug: entry.slug.clone(),
            size: "M".to_string(),
            color: "Red".to_string(),
            delta: StockDelta::Deduct(3),
            requires_op: None,
        })
        .await
        .unwrap();
    churn(&ledger, &entry, 300).await;
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 7);

    let report = h.service.recover_pending_stock_ops().await.unwrap();
    assert_eq!(report.rolled_back, 1);

    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);
    assert_eq!(h.variant_stock(entry.id, "L", "Blue").await, 3);
    let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);

    let catalog = h.catalog.find_by_id(entry.id).await.unwrap().unwrap();
    assert!(!catalog.applied_ops.iter().any(|id| id.starts_with(&op.journal_prefix())));
}

#[tokio::test]
async fn test_recovery_roll_forward_survives_busy_entry() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let order_id = h
        .service
        .create_order(checkout(vec![RequestedItem::new("linen-shirt", "M", "Red", 4)]))
        .await
        .unwrap()
        .orders[0]
        .id;
    let mut order = h.service.transition_status(order_id, OrderStatus::Confirmed).await.unwrap().order;
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 6);

    // Crash after the cancellation's only line was restored
    let op = PendingStockOp::new(StockOpKind::Restore, OrderStatus::Cancelled);
    let expected = order.version;
    order.pending_stock_op = Some(op.clone());
    order.version += 1;
    h.orders.save(&order, expected).await.unwrap();

    let ledger = StockLedger::new(h.catalog.clone(), h.metrics.clone());
    ledger
        .apply(&StockMutation {
            op_id: op.line_op(0),
            catalog_id: entry.id,
            slug: entry.slug.clone(),
            size: "M".to_string(),
            color: "Red".to_string(),
            delta: StockDelta::Restore(4),
            requires_op: None,
        })
        .await
        .unwrap();
    churn(&ledger, &entry, 300).await;

    let report = h.service.recover_pending_stock_ops().await.unwrap();
    assert_eq!(report.rolled_forward, 1);

    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);
    let stored = h.orders.find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_resolved_transitions_leave_no_journal_behind() {
    let h = Harness::new();
    let entry = shirt();
    h.seed(&entry).await;

    let order_id = h
        .service
        .create_order(checkout(vec![
            RequestedItem::new("linen-shirt", "M", "Red", 2),
            RequestedItem::new("linen-shirt", "L", "Blue", 1),
        ]))
        .await
        .unwrap()
        .orders[0]
        .id;
    h.service.transition_status(order_id, OrderStatus::Confirmed).await.unwrap();
    h.service.transition_status(order_id, OrderStatus::Cancelled).await.unwrap();

    let catalog = h.catalog.find_by_id(entry.id).await.unwrap().unwrap();
    assert!(catalog.applied_ops.is_empty());
    assert_eq!(h.variant_stock(entry.id, "M", "Red").await, 10);
    assert_eq!(h.variant_stock(entry.id, "L", "Blue").await, 3);
}
