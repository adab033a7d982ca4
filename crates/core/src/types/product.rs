//! Product data as served by the storefront API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// A product as the API returns it, captured at the moment it was added to a
/// cart or favorites list.
///
/// Field names follow the API's JSON (`titulo`, `preco`, ...). Every piece in
/// the shop is a unique secondhand item, so `status` tells whether it is still
/// available (`"disponivel"`) or already sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "preco")]
    pub price: Decimal,
    #[serde(rename = "imagem", default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "categoria", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "descricao", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ProductSnapshot {
    /// Status value for pieces that can still be bought.
    pub const AVAILABLE: &'static str = "disponivel";

    /// Create a minimal snapshot with only the fields carts need.
    #[must_use]
    pub fn new(id: ProductId, title: impl Into<String>, price: Decimal) -> Self {
        Self {
            id,
            title: title.into(),
            price,
            image: None,
            category: None,
            description: None,
            status: None,
        }
    }

    /// Whether the product is still for sale. Missing status counts as
    /// available.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status.as_deref().is_none_or(|s| s == Self::AVAILABLE)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_api_shape() {
        let json = r#"{
            "id": 42,
            "titulo": "Vestido de seda",
            "preco": 100,
            "imagem": "https://cdn.example/42.jpg",
            "categoria": "Vestidos",
            "status": "disponivel"
        }"#;
        let product: ProductSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(product.id, ProductId::new(42));
        assert_eq!(product.price, Decimal::from(100));
        assert_eq!(product.category.as_deref(), Some("Vestidos"));
        assert!(product.description.is_none());
        assert!(product.is_available());
    }

    #[test]
    fn test_sold_piece_is_unavailable() {
        let mut product = ProductSnapshot::new(ProductId::new(1), "Bolsa", Decimal::from(80));
        assert!(product.is_available());
        product.status = Some("vendido".to_string());
        assert!(!product.is_available());
    }
}
