//! Payment processing: exactly-once business semantics over an
//! at-most-once gateway call, keyed by caller-supplied idempotency keys.

mod error;
mod gateway;
mod payment;
mod processor;

pub use error::PaymentError;
pub use gateway::{ChargeOutcome, ChargeRequest, GatewayMode, PaymentGateway, SimulatedGateway};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use processor::PaymentProcessor;
