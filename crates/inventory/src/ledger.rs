use async_trait::async_trait;
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

/// Stock counters for one product.
///
/// Invariant: `reserved_quantity <= stock_quantity` at all times, so
/// `available()` never underflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    /// The product these counters belong to.
    pub product_id: ProductId,

    /// Human-readable SKU, snapshotted into audit events.
    pub sku: String,

    /// Physical units on hand, including reserved ones.
    pub stock_quantity: u32,

    /// Units claimed by in-flight orders.
    pub reserved_quantity: u32,

    /// Threshold below which the product counts as low-stock.
    pub low_stock_threshold: u32,
}

impl StockLevel {
    /// Units that can still be reserved.
    pub fn available(&self) -> u32 {
        self.stock_quantity - self.reserved_quantity
    }

    /// True if at least one unit is available.
    pub fn is_in_stock(&self) -> bool {
        self.available() > 0
    }

    /// Low-stock is a derived read, not a stored state.
    pub fn is_low_stock(&self) -> bool {
        self.available() <= self.low_stock_threshold
    }
}

/// Result of a release call.
///
/// Release never fails the caller: compensation must be unconditionally
/// safe to run. A `NoOp` means the ledger had nothing to undo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The reservation was (fully or partially) released.
    Released(StockLevel),

    /// Nothing was released; the mismatch was logged.
    NoOp,
}

/// Atomic reserve/release/confirm operations over per-product stock.
///
/// `Err(Unavailable)` from any method signals a transport failure to a
/// remote ledger and is the only retryable outcome.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Reserves `quantity` units for `order_id`.
    ///
    /// Succeeds only if, atomically, `stock - reserved >= quantity`; the
    /// check and the increment are one conditional update, so concurrent
    /// reservations for the last unit resolve to exactly one winner.
    async fn reserve(
        &self,
        product_id: ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<StockLevel, InventoryError>;

    /// Releases a previous reservation, floored at zero.
    ///
    /// A quantity mismatch is logged as a warning and reported as
    /// [`ReleaseOutcome::NoOp`], never as an error to the caller.
    async fn release(
        &self,
        product_id: ProductId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<ReleaseOutcome, InventoryError>;

    /// Finalizes a sale: decrements both stock and reserved counters,
    /// permanently retiring the units.
    async fn confirm_sale(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError>;

    /// Adds units back to physical stock.
    async fn restock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockLevel, InventoryError>;

    /// Current counters for one product.
    async fn stock_level(&self, product_id: ProductId) -> Result<StockLevel, InventoryError>;

    /// Every product whose availability is at or below its threshold.
    async fn low_stock(&self) -> Result<Vec<StockLevel>, InventoryError>;
}
