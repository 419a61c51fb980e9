//! Shared building blocks for the order system: typed identifiers,
//! fixed-point money, aggregate versions, and the closed error taxonomy.

mod error;
mod money;
mod types;

pub use error::{Classify, ErrorKind};
pub use money::Money;
pub use types::{OrderId, PaymentId, ProductId, UserId, Version};
