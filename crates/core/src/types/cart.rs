//! Cart line items, cart policy and derived totals.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::ShippingRule;
use super::product::ProductSnapshot;

/// An item that lives in a local collection, identified by its product.
///
/// Collections hold at most one entry per product ID.
pub trait CollectionItem {
    /// The product this entry refers to.
    fn product_id(&self) -> ProductId;
}

/// One product in the cart.
///
/// Serialized with the storefront's persisted cart shape
/// (`id`, `titulo`, `preco`, `imagem`, `categoria`, `quantity`), so carts
/// written by earlier app versions still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "id")]
    pub product_id: ProductId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "preco")]
    pub unit_price: Decimal,
    #[serde(rename = "imagem", default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(rename = "categoria", default, skip_serializing_if = "Option::is_none")]
    pub category_ref: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

impl LineItem {
    /// A single unit of `product`.
    #[must_use]
    pub fn from_product(product: &ProductSnapshot) -> Self {
        Self {
            product_id: product.id,
            title: product.title.clone(),
            unit_price: product.price,
            image_ref: product.image.clone(),
            category_ref: product.category.clone(),
            quantity: 1,
        }
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

impl CollectionItem for LineItem {
    fn product_id(&self) -> ProductId {
        self.product_id
    }
}

/// How repeated adds of the same product behave.
///
/// The web storefront sells one-off secondhand pieces and refuses a second
/// add; the mobile app historically counted units. Both are supported and the
/// deployment chooses one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CartPolicy {
    /// At most one line per product, quantity fixed at 1.
    #[default]
    UniquePieces,
    /// Repeated adds increment the line's quantity.
    Stocked,
}

/// Error parsing a [`CartPolicy`] from configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cart policy '{0}' (expected 'unique' or 'stocked')")]
pub struct CartPolicyError(pub String);

impl FromStr for CartPolicy {
    type Err = CartPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unique" | "unique_pieces" => Ok(Self::UniquePieces),
            "stocked" | "quantity" => Ok(Self::Stocked),
            other => Err(CartPolicyError(other.to_string())),
        }
    }
}

/// Result of adding an item to a local collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The item was appended.
    Added,
    /// The product was already in the collection; nothing changed.
    AlreadyPresent,
    /// The product was already in the cart and its quantity is now `n`
    /// (stocked carts only).
    QuantityIncreased(u32),
}

impl AddOutcome {
    /// Whether the add was a no-op because the product was already there.
    #[must_use]
    pub const fn already_present(self) -> bool {
        matches!(self, Self::AlreadyPresent)
    }
}

/// Totals derived from the current cart lines. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartSummary {
    /// Total units across all lines.
    pub count: u32,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl CartSummary {
    /// Compute totals for `items` under `rule`.
    #[must_use]
    pub fn from_items(items: &[LineItem], rule: &ShippingRule) -> Self {
        let count = items.iter().map(|item| item.quantity).sum();
        let subtotal: Decimal = items.iter().map(LineItem::line_total).sum();
        let shipping = rule.shipping_for(subtotal);
        Self {
            count,
            subtotal,
            shipping,
            total: subtotal + shipping,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn piece(id: i32, price: Decimal) -> LineItem {
        LineItem::from_product(&ProductSnapshot::new(
            ProductId::new(id),
            format!("Peça {id}"),
            price,
        ))
    }

    #[test]
    fn test_line_item_persisted_shape() {
        let item = piece(42, Decimal::from(100));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["titulo"], "Peça 42");
        assert_eq!(json["quantity"], 1);
        assert!(json.get("imagem").is_none());
    }

    #[test]
    fn test_line_item_quantity_defaults_to_one() {
        let item: LineItem =
            serde_json::from_str(r#"{"id": 3, "titulo": "Saia", "preco": "59.90"}"#).unwrap();
        assert_eq!(item.quantity, 1);
        assert_eq!(item.unit_price, Decimal::new(5990, 2));
    }

    #[test]
    fn test_summary_below_threshold_adds_fee() {
        let items = vec![piece(42, Decimal::from(100))];
        let summary = CartSummary::from_items(&items, &ShippingRule::default());
        assert_eq!(summary.count, 1);
        assert_eq!(summary.subtotal, Decimal::from(100));
        assert_eq!(summary.shipping, Decimal::from(15));
        assert_eq!(summary.total, Decimal::from(115));
    }

    #[test]
    fn test_summary_counts_quantities() {
        let mut item = piece(1, Decimal::from(50));
        item.quantity = 3;
        let summary = CartSummary::from_items(&[item], &ShippingRule::default());
        assert_eq!(summary.count, 3);
        assert_eq!(summary.subtotal, Decimal::from(150));
        assert_eq!(summary.shipping, Decimal::ZERO);
        assert_eq!(summary.total, Decimal::from(150));
    }

    #[test]
    fn test_cart_policy_from_str() {
        assert_eq!("unique".parse::<CartPolicy>(), Ok(CartPolicy::UniquePieces));
        assert_eq!(" Stocked ".parse::<CartPolicy>(), Ok(CartPolicy::Stocked));
        assert!("bulk".parse::<CartPolicy>().is_err());
    }

    #[test]
    fn test_add_outcome_already_present() {
        assert!(AddOutcome::AlreadyPresent.already_present());
        assert!(!AddOutcome::Added.already_present());
        assert!(!AddOutcome::QuantityIncreased(2).already_present());
    }
}
