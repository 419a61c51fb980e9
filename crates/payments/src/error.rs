use common::{Classify, ErrorKind, OrderId, PaymentId, UserId};
use thiserror::Error;

use crate::payment::PaymentStatus;

/// Errors raised by payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// No payment with that ID exists.
    #[error("payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// The payment belongs to a different user.
    #[error("payment {payment_id} does not belong to user {user_id}")]
    NotOwner {
        payment_id: PaymentId,
        user_id: UserId,
    },

    /// Refund requested for a payment that is not completed.
    #[error("only completed payments can be refunded, payment {payment_id} is {status}")]
    RefundNotAllowed {
        payment_id: PaymentId,
        status: PaymentStatus,
    },

    /// The idempotency key is already bound to a different order.
    #[error("idempotency key '{key}' was already used for order {order_id}")]
    KeyAlreadyUsed { key: String, order_id: OrderId },

    /// Internal bookkeeping broke an invariant.
    #[error("payment store inconsistency: {0}")]
    Inconsistency(String),
}

impl Classify for PaymentError {
    fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::PaymentNotFound(_) => ErrorKind::NotFound,
            PaymentError::NotOwner { .. } => ErrorKind::BusinessRule,
            PaymentError::RefundNotAllowed { .. } => ErrorKind::BusinessRule,
            PaymentError::KeyAlreadyUsed { .. } => ErrorKind::Conflict,
            PaymentError::Inconsistency(_) => ErrorKind::Internal,
        }
    }
}
