//! Value objects owned by the order aggregate.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// One line of an order.
///
/// Name, SKU, and unit price are snapshots taken at order time and are
/// never re-read from the catalog later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// The product this line refers to.
    pub product_id: ProductId,

    /// SKU snapshot at order time.
    pub sku: String,

    /// Product name snapshot at order time.
    pub product_name: String,

    /// Unit price snapshot at order time.
    pub unit_price: Money,

    /// Quantity ordered, always greater than zero.
    pub quantity: u32,

    /// `unit_price × quantity`.
    pub subtotal: Money,
}

impl OrderLine {
    /// Creates a line, computing its subtotal from the snapshot price.
    pub fn new(
        product_id: ProductId,
        sku: impl Into<String>,
        product_name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            sku: sku.into(),
            product_name: product_name.into(),
            unit_price,
            quantity,
            subtotal: unit_price.multiply(quantity),
        }
    }
}

/// Shipping destination, copied into the order at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub recipient_name: String,
    pub recipient_phone: Option<String>,
}

impl ShippingAddress {
    /// Single-line rendering used in events and notifications.
    pub fn formatted(&self) -> String {
        format!(
            "{}, {}, {} {}, {}",
            self.street, self.city, self.state, self.postal_code, self.country
        )
    }
}
