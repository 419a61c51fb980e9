//! Order status machine.

use serde::{Deserialize, Serialize};

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► PaymentProcessing ──┬──► Confirmed ──► Processing ──► Shipped ──► Delivered
///                                 │        │              │
///                                 │        └──────────────┴──► Refunded
///                                 └──► PaymentFailed ──► PaymentProcessing (new key)
///
/// Cancelled is reachable from every state before Shipped.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order created, inventory reserved, awaiting payment.
    #[default]
    Pending,

    /// A payment attempt is in flight.
    PaymentProcessing,

    /// The payment attempt failed; a retry uses a new idempotency key.
    PaymentFailed,

    /// Payment captured, stock sold through.
    Confirmed,

    /// Order is being prepared for shipment.
    Processing,

    /// Order handed to the carrier.
    Shipped,

    /// Order arrived (terminal state).
    Delivered,

    /// Order cancelled before shipping (terminal state).
    Cancelled,

    /// Payment refunded after confirmation (terminal state).
    Refunded,
}

impl OrderStatus {
    /// Returns true if moving from this status to `next` is legal.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, PaymentProcessing)
                | (PaymentProcessing, Confirmed)
                | (PaymentProcessing, PaymentFailed)
                | (PaymentFailed, PaymentProcessing)
                | (Confirmed, Processing)
                | (Confirmed, Refunded)
                | (Processing, Shipped)
                | (Processing, Refunded)
                | (Shipped, Delivered)
        ) || (next == Cancelled && self.can_cancel())
    }

    /// Cancellation is allowed from any state before shipping.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending
                | OrderStatus::PaymentProcessing
                | OrderStatus::PaymentFailed
                | OrderStatus::Confirmed
                | OrderStatus::Processing
        )
    }

    /// Returns true if a payment attempt may start from this status.
    pub fn accepts_payment(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PaymentFailed)
    }

    /// Returns true while the inventory ledger still holds this order's
    /// reservations. Once a payment settles, the reservation has either
    /// been sold through (`Confirmed`) or released (`PaymentFailed`).
    pub fn holds_reservation(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PaymentProcessing)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::PaymentProcessing => "PaymentProcessing",
            OrderStatus::PaymentFailed => "PaymentFailed",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
