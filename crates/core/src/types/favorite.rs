//! Favorited products.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cart::CollectionItem;
use super::id::ProductId;
use super::product::ProductSnapshot;

/// A product in the user's favorites list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteItem {
    pub product_id: ProductId,
    pub product: ProductSnapshot,
    pub added_at: DateTime<Utc>,
}

impl FavoriteItem {
    /// Favorite `product` now.
    #[must_use]
    pub fn new(product: ProductSnapshot) -> Self {
        Self::added_at(product, Utc::now())
    }

    /// Favorite `product` with an explicit timestamp (remote snapshots carry
    /// their own).
    #[must_use]
    pub const fn added_at(product: ProductSnapshot, added_at: DateTime<Utc>) -> Self {
        Self {
            product_id: product.id,
            product,
            added_at,
        }
    }
}

impl CollectionItem for FavoriteItem {
    fn product_id(&self) -> ProductId {
        self.product_id
    }
}

/// Result of toggling a favorite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
}
