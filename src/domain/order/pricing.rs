use rust_decimal::Decimal;

use crate::domain::catalog::Variant;

/// Per-line amounts derived from a variant and a quantity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePricing {
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub line_discount: Decimal,
}

/// Discount price wins when set and positive; the discount is the per-unit
/// saving times quantity
pub fn price_line(variant: &Variant, quantity: u32) -> LinePricing {
    let quantity = Decimal::from(quantity);

    match variant.effective_discount() {
        Some(discount_price) => LinePricing {
            unit_price: discount_price,
            total_price: discount_price * quantity,
            line_discount: (variant.price - discount_price) * quantity,
        },
        None => LinePricing {
            unit_price: variant.price,
            total_price: variant.price * quantity,
            line_discount: Decimal::ZERO,
        },
    }
}
