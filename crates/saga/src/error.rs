use common::{Classify, ErrorKind, Money, OrderId, ProductId};
use inventory::InventoryError;
use orders::{OrderError, StoreError};
use payments::PaymentError;
use thiserror::Error;

/// Errors surfaced by the order coordinator.
///
/// Partial progress is never visible here: by the time one of these
/// reaches the caller, compensation has already run.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The request was malformed before any work started.
    #[error("invalid order request: {0}")]
    Validation(String),

    /// The referenced order does not exist.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// A requested product has no catalog entry.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// The product exists but cannot be sold right now.
    #[error("product {sku} is not available for sale")]
    ProductNotSellable { product_id: ProductId, sku: String },

    /// The submitted payment amount does not match the order total.
    #[error("payment amount {supplied} does not match order total {expected}")]
    AmountMismatch { supplied: Money, expected: Money },

    /// Refund requested for an order that never completed a payment.
    #[error("order {0} has no refundable payment")]
    NoRefundablePayment(OrderId),

    /// Inventory ledger failure.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Order aggregate rule violation.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Order store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Payment processor failure.
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl Classify for CoordinatorError {
    fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::Validation(_) => ErrorKind::Validation,
            CoordinatorError::OrderNotFound(_) | CoordinatorError::ProductNotFound(_) => {
                ErrorKind::NotFound
            }
            CoordinatorError::ProductNotSellable { .. }
            | CoordinatorError::AmountMismatch { .. }
            | CoordinatorError::NoRefundablePayment(_) => ErrorKind::BusinessRule,
            CoordinatorError::Inventory(e) => e.kind(),
            CoordinatorError::Order(e) => e.kind(),
            CoordinatorError::Store(e) => e.kind(),
            CoordinatorError::Payment(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_kind() {
        let err = CoordinatorError::from(InventoryError::InsufficientStock {
            product_id: ProductId::new(),
            requested: 2,
            available: 0,
        });
        assert_eq!(err.kind(), ErrorKind::BusinessRule);

        let err = CoordinatorError::from(InventoryError::Unavailable("down".to_string()));
        assert_eq!(err.kind(), ErrorKind::DownstreamUnavailable);

        let err = CoordinatorError::from(StoreError::VersionConflict {
            order_id: OrderId::new(),
            expected: common::Version::first(),
            actual: common::Version::new(2),
        });
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn own_variants_classify() {
        assert_eq!(
            CoordinatorError::Validation("empty".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            CoordinatorError::ProductNotFound(ProductId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoordinatorError::AmountMismatch {
                supplied: Money::from_cents(1),
                expected: Money::from_cents(2),
            }
            .kind(),
            ErrorKind::BusinessRule
        );
    }
}
