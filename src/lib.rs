// ============================================================================
// Fulfillment Core
// ============================================================================
//
// Multi-vendor order fulfillment:
// - domain:    catalog model, checkout, order state machine, stock ledger
// - store:     storage ports with in-memory and ScyllaDB implementations
// - mirror:    search-index mirror of catalog stock/rating (Redis, in-memory)
// - sync:      inline mirror sync with an outbox relay and dead letters
// - dashboard: time-bucketed sales reporting in the business timezone
// - metrics:   Prometheus registry and HTTP exporter
//
// ============================================================================

pub mod config;
pub mod dashboard;
pub mod domain;
pub mod metrics;
pub mod mirror;
pub mod store;
pub mod sync;
pub mod utils;
