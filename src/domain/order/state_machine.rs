use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::value_objects::{Order, OrderStatus, StockOpKind};

// ============================================================================
// Order Status State Machine
// ============================================================================
//
// Strict graph:
//
//   PENDING ──> CONFIRMED ──> PROCESSING ──> SHIPPED ──> DELIVERED
//      │            │              │
//      └────────────┴──────────────┴──> CANCELLED
//
// Permissive mode accepts any change of status. Stock effects are decided by
// the order's `stock_deducted` flag, not by the previous status, so repeated
// confirmations never deduct twice and repeated cancellations never restore
// twice in either mode.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    #[default]
    Strict,
    Permissive,
}

impl std::str::FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(TransitionPolicy::Strict),
            "permissive" => Ok(TransitionPolicy::Permissive),
            other => Err(format!("unknown transition policy: {}", other)),
        }
    }
}

impl TransitionPolicy {
    pub fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::*;

        if from == to {
            return false;
        }

        match self {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::Strict => matches!(
                (from, to),
                (Pending, Confirmed)
                    | (Pending, Cancelled)
                    | (Confirmed, Processing)
                    | (Confirmed, Cancelled)
                    | (Processing, Shipped)
                    | (Processing, Cancelled)
                    | (Shipped, Delivered)
            ),
        }
    }
}

/// Validate a requested transition and decide its stock side effect
pub fn plan_transition(
    order: &Order,
    to: OrderStatus,
    policy: TransitionPolicy,
) -> Result<Option<StockOpKind>, OrderError> {
    if !policy.allows(order.status, to) {
        return Err(OrderError::InvalidTransition { from: order.status, to });
    }

    let effect = match to {
        OrderStatus::Confirmed if !order.stock_deducted => Some(StockOpKind::Deduct),
        OrderStatus::Cancelled if order.stock_deducted => Some(StockOpKind::Restore),
        _ => None,
    };

    Ok(effect)
}
