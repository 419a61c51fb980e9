//! Exchange and routing-key names for every event the system publishes.
//!
//! Consumers register subscribers against routing keys; publishers never
//! invent ad-hoc topic strings.

/// Exchange for order lifecycle events.
pub const ORDER_EXCHANGE: &str = "order.exchange";

/// Exchange for payment lifecycle events.
pub const PAYMENT_EXCHANGE: &str = "payment.exchange";

/// Exchange for inventory mutations.
pub const INVENTORY_EXCHANGE: &str = "inventory.exchange";

/// A new order was created and persisted.
pub const ORDER_CREATED: &str = "order.created";

/// An order was cancelled.
pub const ORDER_CANCELLED: &str = "order.cancelled";

/// A payment completed successfully.
pub const PAYMENT_COMPLETED: &str = "payment.completed";

/// A payment failed (declined, timed out, or errored).
pub const PAYMENT_FAILED: &str = "payment.failed";

/// A completed payment was refunded.
pub const PAYMENT_REFUNDED: &str = "payment.refunded";

/// Stock was reserved for an order.
pub const INVENTORY_RESERVED: &str = "inventory.reserved";

/// A reservation was released back to available stock.
pub const INVENTORY_RELEASED: &str = "inventory.released";
