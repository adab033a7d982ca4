//! Core types for the Luxus storefront client.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod favorite;
pub mod id;
pub mod price;
pub mod product;
pub mod user;

pub use cart::{AddOutcome, CartPolicy, CartPolicyError, CartSummary, CollectionItem, LineItem};
pub use email::{Email, EmailError};
pub use favorite::{FavoriteItem, ToggleOutcome};
pub use id::*;
pub use price::{CurrencyCode, Price, ShippingRule};
pub use product::ProductSnapshot;
pub use user::{UserRole, UserSnapshot};
