use common::{Classify, ErrorKind, OrderId, ProductId, UserId};
use thiserror::Error;

use crate::status::OrderStatus;

/// Errors raised by order aggregate operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// An order must contain at least one line.
    #[error("order must contain at least one line")]
    EmptyOrder,

    /// Line quantities must be greater than zero.
    #[error("quantity must be greater than zero for product {0}")]
    InvalidQuantity(ProductId),

    /// The requested status change is not in the state machine.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The order belongs to a different user.
    #[error("order {order_id} does not belong to user {user_id}")]
    NotOwner { order_id: OrderId, user_id: UserId },
}

impl Classify for OrderError {
    fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyOrder | OrderError::InvalidQuantity(_) => ErrorKind::Validation,
            OrderError::InvalidTransition { .. } => ErrorKind::BusinessRule,
            OrderError::NotOwner { .. } => ErrorKind::BusinessRule,
        }
    }
}
