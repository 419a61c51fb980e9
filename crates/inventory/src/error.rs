use common::{Classify, ErrorKind, ProductId};
use thiserror::Error;

/// Errors raised by inventory ledger operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The product has no ledger entry.
    #[error("product not found in ledger: {0}")]
    ProductNotFound(ProductId),

    /// The conditional reserve found fewer available units than requested.
    #[error(
        "insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The ledger backend was unreachable.
    #[error("inventory ledger unavailable: {0}")]
    Unavailable(String),
}

impl Classify for InventoryError {
    fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::ProductNotFound(_) => ErrorKind::NotFound,
            InventoryError::InsufficientStock { .. } => ErrorKind::BusinessRule,
            InventoryError::Unavailable(_) => ErrorKind::DownstreamUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            InventoryError::ProductNotFound(ProductId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            InventoryError::InsufficientStock {
                product_id: ProductId::new(),
                requested: 5,
                available: 2,
            }
            .kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(
            InventoryError::Unavailable("timeout".to_string()).kind(),
            ErrorKind::DownstreamUnavailable
        );
    }
}
