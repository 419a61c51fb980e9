//! Order aggregate root.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId, Version};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrderError;
use crate::pricing::PricingRules;
use crate::status::OrderStatus;
use crate::value_objects::{OrderLine, ShippingAddress};

/// A customer order with its lines, owned whole by the order store.
///
/// Lines and monetary fields are fixed at creation; afterwards only the
/// status, payment reference, and timestamps change, and every change
/// goes through [`Order::transition`] so illegal moves are impossible.
/// Orders are never physically deleted; cancellation is a status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,

    /// Human-readable unique number, e.g. `ORD-20260314093122-0042`.
    pub order_number: String,

    pub user_id: UserId,

    pub lines: Vec<OrderLine>,

    pub status: OrderStatus,

    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Destination snapshot copied at creation time.
    pub shipping_address: ShippingAddress,

    /// Set once a payment attempt completes.
    pub payment_id: Option<PaymentId>,

    /// Payment method requested at creation, if any.
    pub payment_method: Option<String>,

    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,

    /// Store version for optimistic concurrency.
    #[serde(default)]
    pub version: Version,
}

impl Order {
    /// Creates a `Pending` order, pricing it with the given rules.
    pub fn new(
        id: OrderId,
        user_id: UserId,
        lines: Vec<OrderLine>,
        shipping_address: ShippingAddress,
        rules: &PricingRules,
        payment_method: Option<String>,
        notes: Option<String>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        for line in &lines {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity(line.product_id));
            }
        }

        let subtotal: Money = lines.iter().map(|line| line.subtotal).sum();
        let quote = rules.quote(subtotal);

        Ok(Self {
            id,
            order_number: generate_order_number(),
            user_id,
            lines,
            status: OrderStatus::Pending,
            subtotal: quote.subtotal,
            tax: quote.tax,
            shipping: quote.shipping,
            discount: quote.discount,
            total: quote.total,
            currency: "USD".to_string(),
            shipping_address,
            payment_id: None,
            payment_method,
            notes,
            created_at: Utc::now(),
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            version: Version::initial(),
        })
    }

    /// Moves the order to `next`, stamping lifecycle timestamps.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        match next {
            OrderStatus::Confirmed => self.paid_at = Some(Utc::now()),
            OrderStatus::Shipped => self.shipped_at = Some(Utc::now()),
            OrderStatus::Delivered => self.delivered_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Checks that this order belongs to `user_id`.
    pub fn ensure_owned_by(&self, user_id: UserId) -> Result<(), OrderError> {
        if self.user_id != user_id {
            return Err(OrderError::NotOwner {
                order_id: self.id,
                user_id,
            });
        }
        Ok(())
    }

    /// Total units across all lines.
    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// The monetary invariant: `total = subtotal + tax + shipping - discount`
    /// and `subtotal = Σ line.subtotal`.
    pub fn totals_consistent(&self) -> bool {
        let line_sum: Money = self.lines.iter().map(|line| line.subtotal).sum();
        line_sum == self.subtotal
            && self.total == self.subtotal + self.tax + self.shipping - self.discount
    }
}

/// Generates a unique order number: timestamp plus a random suffix.
fn generate_order_number() -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = Uuid::new_v4().as_u128() % 10_000;
    format!("ORD-{timestamp}-{suffix:04}")
}
