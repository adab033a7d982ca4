//! Prices and shipping cost rules using decimal arithmetic.
//!
//! Cart totals are sums of unit prices, so they are kept as
//! [`rust_decimal::Decimal`] rather than floats; `149.99 + 0.01` must compare
//! equal to the free-shipping threshold of `150.00`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (reais, not centavos).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// A price in the store's default currency.
    #[must_use]
    pub const fn brl(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::BRL)
    }

    /// Format for display, e.g. `R$ 115.00`.
    #[must_use]
    pub fn display(&self) -> String {
        format!(
            "{} {:.2}",
            self.currency_code.symbol(),
            self.amount.round_dp(2)
        )
    }
}

/// ISO 4217 currency codes the storefront can price in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    BRL,
    USD,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::BRL => "R$",
            Self::USD => "$",
        }
    }
}

/// Shipping cost derivation: free above a subtotal threshold, a flat fee
/// below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingRule {
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Decimal,
    /// Fee charged when the subtotal is below the threshold.
    pub flat_fee: Decimal,
}

impl ShippingRule {
    /// Default free-shipping threshold (R$ 150,00).
    pub const DEFAULT_THRESHOLD: Decimal = Decimal::from_parts(150, 0, 0, false, 0);
    /// Default flat fee (R$ 15,00).
    pub const DEFAULT_FLAT_FEE: Decimal = Decimal::from_parts(15, 0, 0, false, 0);

    /// Create a rule from a threshold and a flat fee.
    #[must_use]
    pub const fn new(free_shipping_threshold: Decimal, flat_fee: Decimal) -> Self {
        Self {
            free_shipping_threshold,
            flat_fee,
        }
    }

    /// Shipping cost for a subtotal.
    ///
    /// An empty cart has a zero subtotal and is charged the flat fee, matching
    /// what the storefront checkout shows.
    #[must_use]
    pub fn shipping_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal >= self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.flat_fee
        }
    }
}

impl Default for ShippingRule {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD, Self::DEFAULT_FLAT_FEE)
    }
}
