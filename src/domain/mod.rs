// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - catalog:   products with embedded size/color variants
// - inventory: journaled, compare-and-set stock mutations on variants
// - order:     checkout, pricing, status state machine, order service
//
// Storage lives behind the ports in `crate::store`; nothing here knows
// which backend is in use.
//
// ============================================================================

pub mod catalog;
pub mod inventory;
pub mod order;
