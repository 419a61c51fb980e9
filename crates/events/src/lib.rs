//! Domain event plumbing: the event envelope, the topic registry, and a
//! fire-and-forget publisher with explicitly registered subscribers.
//!
//! The bus guarantees at-least-once delivery at most; consumers are
//! idempotent by design and no publisher ever awaits delivery outcomes.

mod envelope;
mod payloads;
mod publisher;
pub mod topics;

pub use envelope::EventEnvelope;
pub use payloads::{
    InventoryChangePayload, OrderCancelledPayload, OrderCreatedPayload, OrderLinePayload,
    PaymentEventPayload,
};
pub use publisher::{
    EventBusError, EventPublisher, EventSubscriber, InMemoryEventBus, PublishedEvent,
};
