//! Typed payloads for each published routing key.

use common::{Money, OrderId, PaymentId, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// One line of an order as carried inside order events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLinePayload {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

/// Payload for `order.created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedPayload {
    pub order_id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub lines: Vec<OrderLinePayload>,
    pub total: Money,
    pub shipping_address: String,
    pub status: String,
}

/// Payload for `order.cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
}

/// Payload for `inventory.reserved` and `inventory.released`.
///
/// Carries the counters before and after the mutation for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryChangePayload {
    pub product_id: ProductId,
    pub sku: String,
    pub quantity: u32,
    pub stock_before: u32,
    pub reserved_before: u32,
    pub stock_after: u32,
    pub reserved_after: u32,
    pub order_id: Option<OrderId>,
}

/// Payload for `payment.completed`, `payment.failed`, and `payment.refunded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEventPayload {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub refund_amount: Option<Money>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_payload_serialization() {
        let payload = InventoryChangePayload {
            product_id: ProductId::new(),
            sku: "SKU-001".to_string(),
            quantity: 3,
            stock_before: 10,
            reserved_before: 0,
            stock_after: 10,
            reserved_after: 3,
            order_id: Some(OrderId::new()),
        };

        let json = serde_json::to_string(&payload).unwrap();
        let back: InventoryChangePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sku, "SKU-001");
        assert_eq!(back.reserved_after, 3);
    }
}
