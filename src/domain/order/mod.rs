// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (Order, OrderLineItem, OrderStatus, PendingStockOp)
// - Commands (CheckoutRequest, RequestedItem)
// - Errors (OrderError)
// - Pricing and order numbers
// - State machine (allowed transitions and their stock effect)
// - Checkout (resolve, group by vendor, build orders)
// - Command handler (OrderService)
//
// ============================================================================

pub mod value_objects;
pub mod commands;
pub mod errors;
pub mod pricing;
pub mod order_number;
pub mod state_machine;
pub mod checkout;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use commands::*;
pub use errors::*;
pub use pricing::*;
pub use order_number::*;
pub use state_machine::*;
pub use checkout::*;
pub use command_handler::*;
