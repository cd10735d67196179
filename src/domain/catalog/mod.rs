// ============================================================================
// Catalog Domain - Variant-level stock read model
// ============================================================================
//
// Catalog entries are owned by the catalog store. This crate only reads them
// for pricing and mutates variant stock through the inventory ledger.
//
// ============================================================================

pub mod value_objects;

pub use value_objects::*;
