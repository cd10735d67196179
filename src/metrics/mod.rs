mod server;

use prometheus::{
    Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

pub use server::{start_metrics_server, SyncHealth};

// ============================================================================
// Metrics Module - Prometheus metrics for the fulfillment core
// ============================================================================
//
// Covers:
// - Checkout outcomes and order creation
// - Status transitions and their stock mutations (conflicts, compensations,
//   skipped restorations, recovery)
// - Index sync (inline and relay), dead letters and mirror staleness
// - Circuit breaker state of the index mirror
//
// All metrics live in one registry scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Orders
    pub orders_created: IntCounterVec,
    pub checkout_rejections: IntCounterVec,
    pub status_transitions: IntCounterVec,

    // Stock
    pub stock_mutations: IntCounterVec,
    pub stock_conflicts: IntCounter,
    pub stock_compensations: IntCounter,
    pub skipped_restorations: IntCounter,
    pub recovered_stock_ops: IntCounterVec,
    pub stock_op_duration: HistogramVec,

    // Index sync
    pub index_sync: IntCounterVec,
    pub dlq_messages_total: IntCounter,
    pub outbox_backlog: IntGauge,
    pub outbox_oldest_age_seconds: Gauge,
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounterVec::new(
            Opts::new("orders_created_total", "Orders created, one per vendor group"),
            &["owner"],
        )?;
        registry.register(Box::new(orders_created.clone()))?;

        let checkout_rejections = IntCounterVec::new(
            Opts::new("checkout_rejections_total", "Checkouts rejected before any write"),
            &["reason"],
        )?;
        registry.register(Box::new(checkout_rejections.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Committed order status transitions"),
            &["from_status", "to_status"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let stock_mutations = IntCounterVec::new(
            Opts::new("stock_mutations_total", "Variant stock mutations by kind and outcome"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(stock_mutations.clone()))?;

        let stock_conflicts = IntCounter::new(
            "stock_version_conflicts_total",
            "Catalog writes retried after a version conflict",
        )?;
        registry.register(Box::new(stock_conflicts.clone()))?;

        let stock_compensations = IntCounter::new(
            "stock_compensations_total",
            "Deducted lines given back after a failed confirmation",
        )?;
        registry.register(Box::new(stock_compensations.clone()))?;

        let skipped_restorations = IntCounter::new(
            "stock_skipped_restorations_total",
            "Cancelled lines whose variant no longer exists",
        )?;
        registry.register(Box::new(skipped_restorations.clone()))?;

        let recovered_stock_ops = IntCounterVec::new(
            Opts::new("recovered_stock_ops_total", "Interrupted stock operations resolved by recovery"),
            &["kind"],
        )?;
        registry.register(Box::new(recovered_stock_ops.clone()))?;

        let stock_op_duration = HistogramVec::new(
            HistogramOpts::new("stock_op_duration_seconds", "Duration of stock-affecting transitions")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["kind"],
        )?;
        registry.register(Box::new(stock_op_duration.clone()))?;

        let index_sync = IntCounterVec::new(
            Opts::new("index_sync_total", "Index mirror updates by path and outcome"),
            &["path", "outcome"],
        )?;
        registry.register(Box::new(index_sync.clone()))?;

        let dlq_messages_total = IntCounter::new(
            "dlq_messages_total",
            "Index updates moved to the dead letter table",
        )?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let outbox_backlog = IntGauge::new(
            "index_outbox_backlog",
            "Index updates waiting in the outbox",
        )?;
        registry.register(Box::new(outbox_backlog.clone()))?;

        let outbox_oldest_age_seconds = Gauge::new(
            "index_outbox_oldest_age_seconds",
            "Age of the oldest undelivered index update",
        )?;
        registry.register(Box::new(outbox_oldest_age_seconds.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Index mirror circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            checkout_rejections,
            status_transitions,
            stock_mutations,
            stock_conflicts,
            stock_compensations,
            skipped_restorations,
            recovered_stock_ops,
            stock_op_duration,
            index_sync,
            dlq_messages_total,
            outbox_backlog,
            outbox_oldest_age_seconds,
            circuit_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self, is_admin: bool) {
        let owner = if is_admin { "admin" } else { "vendor" };
        self.orders_created.with_label_values(&[owner]).inc();
    }

    pub fn record_checkout_rejection(&self, reason: &str) {
        self.checkout_rejections.with_label_values(&[reason]).inc();
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        self.status_transitions.with_label_values(&[from, to]).inc();
    }

    pub fn record_stock_mutation(&self, kind: &str, outcome: &str) {
        self.stock_mutations.with_label_values(&[kind, outcome]).inc();
    }

    pub fn record_stock_op_duration(&self, kind: &str, duration_secs: f64) {
        self.stock_op_duration.with_label_values(&[kind]).observe(duration_secs);
    }

    pub fn record_index_sync(&self, path: &str, outcome: &str) {
        self.index_sync.with_label_values(&[path, outcome]).inc();
    }

    pub fn record_dlq_message(&self) {
        self.dlq_messages_total.inc();
    }

    pub fn update_outbox_staleness(&self, backlog: usize, oldest_age_secs: f64) {
        self.outbox_backlog.set(backlog as i64);
        self.outbox_oldest_age_seconds.set(oldest_age_secs);
    }

    pub fn update_circuit_breaker_state(&self, state: i64) {
        self.circuit_breaker_state.set(state);
    }
}
