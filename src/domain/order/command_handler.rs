use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::checkout::{build_orders, group_by_vendor, resolve_items, validate_request, OrderCreationResult};
use super::commands::CheckoutRequest;
use super::errors::OrderError;
use super::state_machine::{plan_transition, TransitionPolicy};
use super::value_objects::{Order, OrderLineItem, OrderStatus, PendingStockOp, StockOpKind};
use crate::domain::inventory::{StockApplied, StockDelta, StockLedger, StockMutation};
use crate::metrics::Metrics;
use crate::store::{CatalogRepository, OrderFilter, OrderRepository, OrderSort};
use crate::sync::IndexSynchronizer;
use crate::utils::RetryConfig;

// ============================================================================
// Order Service
// ============================================================================
//
// Entry point for the order lifecycle:
//   create_order              checkout -> per-vendor PENDING orders (one atomic write)
//   transition_status         state machine + stock side effects
//   recover_pending_stock_ops resolves transitions interrupted mid-flight
//
// Stock-affecting transitions run as a saga whose intent lives on the order:
//   1. CAS-write `pending_stock_op` (blocks concurrent transitions)
//   2. mutate each line's variant through the stock ledger (idempotent op ids)
//   3. CAS-write the new status and clear the intent
//   4. release the intent's op ids from the touched catalog entries
// A failed deduction compensates the lines it already took. A crash leaves
// the intent behind for recovery; the journal keeps its op ids until then.
//
// ============================================================================

/// A cancelled line whose stock could not be returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRestoration {
    pub line_index: usize,
    pub catalog_id: Uuid,
    pub slug: String,
    pub size: String,
    pub color: String,
    pub quantity: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub order: Order,
    pub previous_status: OrderStatus,
    pub skipped_restorations: Vec<SkippedRestoration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    /// Interrupted confirmations whose deductions were given back
    pub rolled_back: usize,
    /// Interrupted cancellations completed
    pub rolled_forward: usize,
    /// Orders left with their intent for the next recovery run
    pub failed: usize,
}

pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn CatalogRepository>,
    ledger: StockLedger,
    synchronizer: Arc<IndexSynchronizer>,
    metrics: Arc<Metrics>,
    policy: TransitionPolicy,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<dyn CatalogRepository>,
        synchronizer: Arc<IndexSynchronizer>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            ledger: StockLedger::new(catalog.clone(), metrics.clone()),
            orders,
            catalog,
            synchronizer,
            metrics,
            policy: TransitionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override how catalog version conflicts are retried
    pub fn with_conflict_retry(mut self, retry: RetryConfig) -> Self {
        self.ledger = StockLedger::new(self.catalog.clone(), self.metrics.clone()).with_retry(retry);
        self
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    // ========================================================================
    // Creation
    // ========================================================================

    pub async fn create_order(&self, request: CheckoutRequest) -> Result<OrderCreationResult, OrderError> {
        let lines = match self.resolve_checkout(&request).await {
            Ok(lines) => lines,
            Err(e) => {
                self.metrics.record_checkout_rejection(rejection_reason(&e));
                tracing::info!(error = %e, "Checkout rejected");
                return Err(e);
            }
        };

        let now = Utc::now();
        let checkout_id = Uuid::new_v4();
        let orders = build_orders(group_by_vendor(lines), &request, checkout_id, now);

        self.orders.create_many(&orders).await?;

        for order in &orders {
            self.metrics.record_order_created(order.is_admin);
            tracing::info!(
                order_id = %order.id,
                order_number = %order.order_number,
                checkout_id = %checkout_id,
                vendor_id = %order.vendor_id,
                lines = order.line_items.len(),
                total = %order.order_total,
                "✅ Order created"
            );
        }

        Ok(OrderCreationResult::from_orders(checkout_id, orders))
    }

    async fn resolve_checkout(&self, request: &CheckoutRequest) -> Result<Vec<OrderLineItem>, OrderError> {
        validate_request(request)?;
        resolve_items(self.catalog.as_ref(), &request.items).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| OrderError::order_not_found(order_id))
    }

    pub async fn list_orders(
        &self,
        filter: &OrderFilter,
        sort: OrderSort,
        skip: usize,
        limit: usize,
    ) -> Result<(usize, Vec<Order>), OrderError> {
        Ok(self.orders.count_and_find(filter, sort, skip, limit).await?)
    }

    // ========================================================================
    // Status transitions
    // ========================================================================

    pub async fn transition_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<TransitionOutcome, OrderError> {
        let mut order = self.get_order(order_id).await?;

        if order.pending_stock_op.is_some() {
            return Err(OrderError::ConcurrentModification(order_id));
        }

        let previous_status = order.status;
        let effect = plan_transition(&order, new_status, self.policy)?;

        let outcome = match effect {
            None => {
                order.status = new_status;
                self.save_order(&mut order).await?;
                TransitionOutcome { order, previous_status, skipped_restorations: Vec::new() }
            }
            Some(kind) => self.run_stock_transition(order, kind, new_status).await?,
        };

        self.metrics.record_transition(previous_status.as_str(), new_status.as_str());
        tracing::info!(
            order_id = %order_id,
            from = %previous_status,
            to = %new_status,
            stock_effect = ?effect,
            skipped_restorations = outcome.skipped_restorations.len(),
            "✅ Order status changed"
        );

        Ok(outcome)
    }

    async fn run_stock_transition(
        &self,
        mut order: Order,
        kind: StockOpKind,
        target: OrderStatus,
    ) -> Result<TransitionOutcome, OrderError> {
        let started = Instant::now();
        let previous_status = order.status;
        let op = PendingStockOp::new(kind, target);

        order.pending_stock_op = Some(op.clone());
        self.save_order(&mut order).await?;

        let mut skipped_restorations = Vec::new();
        match kind {
            StockOpKind::Deduct => {
                if let Err(e) = self.deduct_lines(&order, &op).await {
                    self.abandon_deduction(&mut order, &op).await;
                    return Err(e);
                }
                order.stock_deducted = true;
            }
            StockOpKind::Restore => {
                skipped_restorations = self.restore_lines(&order, &op).await?;
                order.stock_deducted = false;
            }
        }

        order.status = target;
        order.pending_stock_op = None;
        self.save_order(&mut order).await?;
        self.release_journal(&order, &op).await;

        self.metrics
            .record_stock_op_duration(stock_op_label(kind), started.elapsed().as_secs_f64());

        Ok(TransitionOutcome { order, previous_status, skipped_restorations })
    }

    async fn deduct_lines(&self, order: &Order, op: &PendingStockOp) -> Result<(), OrderError> {
        for (index, line) in order.line_items.iter().enumerate() {
            let mutation = line_mutation(op.line_op(index), line, StockDelta::Deduct(line.quantity));

            match self.ledger.apply(&mutation).await {
                Ok(applied) => self.sync_applied(&applied).await,
                Err(e) => {
                    tracing::warn!(
                        order_id = %order.id,
                        line_index = index,
                        slug = %line.slug,
                        error = %e,
                        "Stock deduction failed, compensating"
                    );
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Give back every line of a failed deduction and drop the intent. The
    /// intent survives if any compensation fails, so recovery can finish it.
    async fn abandon_deduction(&self, order: &mut Order, op: &PendingStockOp) {
        if let Err(e) = self.compensate(order, op).await {
            tracing::error!(
                order_id = %order.id,
                op_id = %op.op_id,
                error = %e,
                "Compensation incomplete, leaving stock intent for recovery"
            );
            return;
        }

        order.pending_stock_op = None;
        match self.save_order(order).await {
            Ok(()) => self.release_journal(order, op).await,
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Could not clear stock intent after compensation")
            }
        }
    }

    /// Undo journaled deductions of `op`. Lines whose forward op never landed
    /// are left alone, so this is safe to run any number of times.
    async fn compensate(&self, order: &Order, op: &PendingStockOp) -> Result<(), OrderError> {
        let mut first_error = None;

        for (index, line) in order.line_items.iter().enumerate() {
            let mut mutation = line_mutation(op.undo_op(index), line, StockDelta::Restore(line.quantity));
            mutation.requires_op = Some(op.line_op(index));

            match self.ledger.apply(&mutation).await {
                Ok(applied) if applied.changed => {
                    self.metrics.stock_compensations.inc();
                    self.sync_applied(&applied).await;
                }
                Ok(_) => {}
                Err(e) if e.is_missing_target() => {
                    // Nothing was taken from a variant that no longer exists
                    tracing::debug!(order_id = %order.id, line_index = index, "Compensation target gone");
                }
                Err(e) => {
                    tracing::error!(order_id = %order.id, line_index = index, error = %e, "Compensation failed");
                    if first_error.is_none() {
                        first_error = Some(OrderError::from(e));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn restore_lines(
        &self,
        order: &Order,
        op: &PendingStockOp,
    ) -> Result<Vec<SkippedRestoration>, OrderError> {
        let mut skipped = Vec::new();

        for (index, line) in order.line_items.iter().enumerate() {
            let mutation = line_mutation(op.line_op(index), line, StockDelta::Restore(line.quantity));

            match self.ledger.apply(&mutation).await {
                Ok(applied) => self.sync_applied(&applied).await,
                Err(e) if e.is_missing_target() => {
                    tracing::warn!(
                        order_id = %order.id,
                        line_index = index,
                        catalog_id = %line.catalog_id,
                        size = %line.variant.size,
                        color = %line.variant.color,
                        quantity = line.quantity,
                        "PartialRestorationFailure: variant gone, skipping restoration"
                    );
                    self.metrics.skipped_restorations.inc();
                    skipped.push(SkippedRestoration {
                        line_index: index,
                        catalog_id: line.catalog_id,
                        slug: line.slug.clone(),
                        size: line.variant.size.clone(),
                        color: line.variant.color.clone(),
                        quantity: line.quantity,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(skipped)
    }

    /// Forget the op ids of a cleared intent. Must only run once the order no
    /// longer carries `op`, otherwise recovery could replay its lines.
    async fn release_journal(&self, order: &Order, op: &PendingStockOp) {
        let prefix = op.journal_prefix();
        let touched: BTreeSet<Uuid> = order.line_items.iter().map(|l| l.catalog_id).collect();

        for catalog_id in touched {
            if let Err(e) = self.ledger.release(catalog_id, &prefix).await {
                // Leftover ids are inert once the intent is gone
                tracing::warn!(catalog_id = %catalog_id, op_id = %op.op_id, error = %e, "Could not release stock journal");
            }
        }
    }

    async fn sync_applied(&self, applied: &StockApplied) {
        if applied.changed {
            self.synchronizer
                .sync_stock(applied.catalog_id, applied.aggregate_stock, applied.version)
                .await;
        }
    }

    async fn save_order(&self, order: &mut Order) -> Result<(), OrderError> {
        let expected_version = order.version;
        order.version += 1;
        order.updated_at = Utc::now();

        match self.orders.save(order, expected_version).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => Err(OrderError::ConcurrentModification(order.id)),
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Resolve every order left with a stock intent: interrupted deductions
    /// are rolled back, interrupted restorations are completed. Touched
    /// catalog entries are queued for an index refresh.
    pub async fn recover_pending_stock_ops(&self) -> Result<RecoveryReport, OrderError> {
        let stuck = self.orders.find_with_pending_stock_op().await?;
        let mut report = RecoveryReport::default();

        if !stuck.is_empty() {
            tracing::info!(orders = stuck.len(), "🔧 Recovering interrupted stock operations");
        }

        for order in stuck {
            let order_id = order.id;
            match self.recover_order(order).await {
                Ok(StockOpKind::Deduct) => report.rolled_back += 1,
                Ok(StockOpKind::Restore) => report.rolled_forward += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(order_id = %order_id, error = %e, "Stock recovery failed");
                }
            }
        }

        Ok(report)
    }

    async fn recover_order(&self, mut order: Order) -> Result<StockOpKind, OrderError> {
        let Some(op) = order.pending_stock_op.clone() else {
            return Err(OrderError::Validation(format!("order {} has no stock intent", order.id)));
        };

        match op.kind {
            StockOpKind::Deduct => {
                self.compensate(&order, &op).await?;
            }
            StockOpKind::Restore => {
                let skipped = self.restore_lines(&order, &op).await?;
                if !skipped.is_empty() {
                    tracing::warn!(order_id = %order.id, skipped = skipped.len(), "Recovered cancellation skipped lines");
                }
                order.stock_deducted = false;
                order.status = op.target_status;
            }
        }

        order.pending_stock_op = None;
        self.save_order(&mut order).await?;
        self.release_journal(&order, &op).await;

        let touched: BTreeSet<Uuid> = order.line_items.iter().map(|l| l.catalog_id).collect();
        for catalog_id in touched {
            self.synchronizer.resync_stock(catalog_id).await;
        }

        self.metrics
            .recovered_stock_ops
            .with_label_values(&[stock_op_label(op.kind)])
            .inc();
        tracing::info!(
            order_id = %order.id,
            op_id = %op.op_id,
            kind = ?op.kind,
            status = %order.status,
            "✅ Stock intent resolved"
        );

        Ok(op.kind)
    }
}

fn line_mutation(op_id: String, line: &OrderLineItem, delta: StockDelta) -> StockMutation {
    StockMutation {
        op_id,
        catalog_id: line.catalog_id,
        slug: line.slug.clone(),
        size: line.variant.size.clone(),
        color: line.variant.color.clone(),
        delta,
        requires_op: None,
    }
}

fn stock_op_label(kind: StockOpKind) -> &'static str {
    match kind {
        StockOpKind::Deduct => "deduct",
        StockOpKind::Restore => "restore",
    }
}

fn rejection_reason(err: &OrderError) -> &'static str {
    match err {
        OrderError::Validation(_) => "validation",
        OrderError::NotFound { .. } | OrderError::VariantNotFound { .. } => "not_found",
        OrderError::InsufficientStock { .. } => "insufficient_stock",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_order, TestHarness};

    #[tokio::test]
    async fn test_metadata_only_transition_bumps_version() {
        let h = TestHarness::new();
        let order = sample_order(OrderStatus::Confirmed);
        h.orders.create_many(std::slice::from_ref(&order)).await.unwrap();

        let outcome = h.service.transition_status(order.id, OrderStatus::Processing).await.unwrap();

        assert_eq!(outcome.previous_status, OrderStatus::Confirmed);
        assert_eq!(outcome.order.status, OrderStatus::Processing);
        assert_eq!(outcome.order.version, 1);
    }

    #[tokio::test]
    async fn test_transition_refused_while_intent_pending() {
        let h = TestHarness::new();
        let mut order = sample_order(OrderStatus::Pending);
        order.pending_stock_op = Some(PendingStockOp::new(StockOpKind::Deduct, OrderStatus::Confirmed));
        h.orders.create_many(std::slice::from_ref(&order)).await.unwrap();

        let err = h.service.transition_status(order.id, OrderStatus::Cancelled).await.unwrap_err();
        assert!(matches!(err, OrderError::ConcurrentModification(id) if id == order.id));
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let h = TestHarness::new();
        let err = h.service.transition_status(Uuid::new_v4(), OrderStatus::Confirmed).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound { entity: "Order", .. }));
    }

    #[test]
    fn test_rejection_reasons() {
        assert_eq!(rejection_reason(&OrderError::Validation("x".into())), "validation");
        assert_eq!(rejection_reason(&OrderError::catalog_not_found("tee")), "not_found");
    }
}
