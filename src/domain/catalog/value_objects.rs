use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Catalog Value Objects
// ============================================================================

/// Vendor key used for entries owned by the platform itself
pub const ADMIN_VENDOR: &str = "admin";

/// A size/color-specific purchasable unit of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub size: String,
    pub color: String,
    pub price: Decimal,
    /// Only meaningful when strictly positive
    #[serde(default)]
    pub discount_price: Option<Decimal>,
    pub stock: u32,
    #[serde(default)]
    pub sku: Option<String>,
}

impl Variant {
    pub fn new(size: impl Into<String>, color: impl Into<String>, price: Decimal, stock: u32) -> Self {
        Self {
            size: size.into(),
            color: color.into(),
            price,
            discount_price: None,
            stock,
            sku: None,
        }
    }

    pub fn with_discount(mut self, discount_price: Decimal) -> Self {
        self.discount_price = Some(discount_price);
        self
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    /// The discount price if one is set and positive
    pub fn effective_discount(&self) -> Option<Decimal> {
        self.discount_price.filter(|d| *d > Decimal::ZERO)
    }

    /// Case-insensitive, whitespace-trimmed match on size and color
    pub fn matches(&self, size: &str, color: &str) -> bool {
        normalized_eq(&self.size, size) && normalized_eq(&self.color, color)
    }
}

fn normalized_eq(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Denormalized product read-model with embedded variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    /// `None` for platform-owned entries
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub vendor_name: Option<String>,
    pub variants: Vec<Variant>,
    pub aggregate_stock: i64,
    #[serde(default)]
    pub rating: Option<f64>,
    /// Bumped by every persisted change, used for compare-and-set writes
    #[serde(default)]
    pub version: i64,
    /// Stock operation ids applied to this entry whose owning order intent
    /// is still open
    #[serde(default)]
    pub applied_ops: Vec<String>,
}

impl CatalogEntry {
    pub fn new(slug: impl Into<String>, name: impl Into<String>, vendor_id: Option<String>, variants: Vec<Variant>) -> Self {
        let mut entry = Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            name: name.into(),
            vendor_id,
            vendor_name: None,
            variants,
            aggregate_stock: 0,
            rating: None,
            version: 0,
            applied_ops: Vec::new(),
        };
        entry.recompute_aggregate_stock();
        entry
    }

    /// Vendor group this entry's line items belong to
    pub fn vendor_key(&self) -> &str {
        self.vendor_id.as_deref().unwrap_or(ADMIN_VENDOR)
    }

    pub fn find_variant(&self, size: &str, color: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.matches(size, color))
    }

    pub fn find_variant_mut(&mut self, size: &str, color: &str) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| v.matches(size, color))
    }

    pub fn recompute_aggregate_stock(&mut self) {
        self.aggregate_stock = self.variants.iter().map(|v| i64::from(v.stock)).sum();
    }

    pub fn has_applied(&self, op_id: &str) -> bool {
        self.applied_ops.iter().any(|op| op == op_id)
    }

    pub fn record_op(&mut self, op_id: impl Into<String>) {
        self.applied_ops.push(op_id.into());
    }

    /// Forget every journaled op id starting with `prefix`. Returns how many
    /// were dropped.
    pub fn release_ops(&mut self, prefix: &str) -> usize {
        let before = self.applied_ops.len();
        self.applied_ops.retain(|op| !op.starts_with(prefix));
        before - self.applied_ops.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shirt() -> CatalogEntry {
        CatalogEntry::new(
            "linen-shirt",
            "Linen Shirt",
            Some("vendor-a".to_string()),
            vec![
                Variant::new("M", "Red", Decimal::from(500), 10),
                Variant::new("L", "Blue", Decimal::from(550), 4),
            ],
        )
    }

    #[test]
    fn test_variant_match_ignores_case_and_whitespace() {
        let entry = shirt();
        let variant = entry.find_variant(" m ", "RED").unwrap();
        assert_eq!(variant.size, "M");
        assert_eq!(variant.color, "Red");
        assert!(entry.find_variant("M", "Green").is_none());
    }

    #[test]
    fn test_aggregate_stock_is_sum_of_variants() {
        let mut entry = shirt();
        assert_eq!(entry.aggregate_stock, 14);

        entry.find_variant_mut("l", "blue").unwrap().stock = 1;
        entry.recompute_aggregate_stock();
        assert_eq!(entry.aggregate_stock, 11);
    }

    #[test]
    fn test_platform_entries_group_under_admin() {
        let entry = CatalogEntry::new("mug", "Mug", None, vec![]);
        assert_eq!(entry.vendor_key(), ADMIN_VENDOR);
        assert_eq!(shirt().vendor_key(), "vendor-a");
    }

    #[test]
    fn test_zero_discount_is_not_a_discount() {
        let variant = Variant::new("S", "Black", Decimal::from(100), 1).with_discount(Decimal::ZERO);
        assert_eq!(variant.effective_discount(), None);

        let variant = variant.with_discount(Decimal::from(80));
        assert_eq!(variant.effective_discount(), Some(Decimal::from(80)));
    }

    #[test]
    fn test_journal_keeps_ops_regardless_of_traffic() {
        let mut entry = shirt();
        entry.record_op("intent-a:0");
        for i in 0..1000 {
            entry.record_op(format!("intent-b:{}", i));
        }

        assert!(entry.has_applied("intent-a:0"));
        assert_eq!(entry.applied_ops.len(), 1001);
    }

    #[test]
    fn test_release_drops_only_the_owning_intent() {
        let mut entry = shirt();
        entry.record_op("intent-a:0");
        entry.record_op("intent-a:0:undo");
        entry.record_op("intent-b:0");

        assert_eq!(entry.release_ops("intent-a:"), 2);
        assert!(!entry.has_applied("intent-a:0"));
        assert!(entry.has_applied("intent-b:0"));
        assert_eq!(entry.release_ops("intent-a:"), 0);
    }
}
