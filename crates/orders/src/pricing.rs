//! Deterministic order pricing.

use common::Money;
use serde::{Deserialize, Serialize};

/// Pricing inputs treated as external configuration.
///
/// Constructed once at startup and passed by reference; the coordinator
/// never reads hidden process-wide state to price an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRules {
    /// Tax rate in basis points (800 = 8%), applied half-up to the cent.
    pub tax_rate_bps: u32,

    /// Flat shipping fee below the free-shipping threshold.
    pub shipping_fee: Money,

    /// Subtotals at or above this ship free.
    pub free_shipping_threshold: Money,

    /// Flat discount subtracted from the total.
    pub discount: Money,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            tax_rate_bps: 800,
            shipping_fee: Money::from_cents(599),
            free_shipping_threshold: Money::from_cents(5_000),
            discount: Money::zero(),
        }
    }
}

/// The monetary fields of an order, derived from one subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
}

impl PricingRules {
    /// Prices a subtotal. `total = subtotal + tax + shipping - discount`.
    pub fn quote(&self, subtotal: Money) -> PriceBreakdown {
        let tax = subtotal.apply_rate_bps(self.tax_rate_bps);
        let shipping = if subtotal >= self.free_shipping_threshold {
            Money::zero()
        } else {
            self.shipping_fee
        };
        let total = subtotal + tax + shipping - self.discount;
        PriceBreakdown {
            subtotal,
            tax,
            shipping,
            discount: self.discount,
            total,
        }
    }
}
