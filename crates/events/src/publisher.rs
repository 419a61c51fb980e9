//! Publisher trait and in-memory bus implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Classify, ErrorKind};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::envelope::EventEnvelope;

/// Errors raised by the event bus.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The event payload could not be encoded.
    #[error("failed to encode event payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The bus itself was unreachable.
    #[error("event bus unavailable: {0}")]
    Unavailable(String),

    /// A registered subscriber rejected the event.
    #[error("subscriber '{name}' failed: {reason}")]
    Subscriber { name: String, reason: String },
}

impl Classify for EventBusError {
    fn kind(&self) -> ErrorKind {
        match self {
            EventBusError::Serialization(_) => ErrorKind::Internal,
            EventBusError::Unavailable(_) => ErrorKind::DownstreamUnavailable,
            EventBusError::Subscriber { .. } => ErrorKind::Internal,
        }
    }
}

/// Fire-and-forget publication of domain events.
///
/// Publication failures must never roll back already-committed state:
/// callers log the error and move on. The bus provides at-least-once
/// delivery, so every subscriber is idempotent.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an envelope to an exchange under a routing key.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: EventEnvelope,
    ) -> Result<(), EventBusError>;
}

/// A subscriber function registered against a routing key.
///
/// Handlers must be idempotent and independent of delivery order across
/// topics; a handler failure is logged by the bus and never propagates
/// to the publisher.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Name used in logs when this subscriber fails.
    fn name(&self) -> &'static str;

    /// Handles one delivered envelope.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), EventBusError>;
}

/// An envelope as recorded by the in-memory bus, with its routing.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub exchange: String,
    pub routing_key: String,
    pub envelope: EventEnvelope,
}

#[derive(Default)]
struct BusState {
    subscribers: HashMap<String, Vec<Arc<dyn EventSubscriber>>>,
    published: Vec<PublishedEvent>,
}

/// In-memory event bus.
///
/// Delivers synchronously to subscribers registered for the routing key
/// and keeps every published envelope for inspection. Stands in for a
/// durable broker behind the same [`EventPublisher`] interface.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<BusState>>,
}

impl InMemoryEventBus {
    /// Creates a new bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for a routing key.
    pub async fn subscribe(&self, routing_key: impl Into<String>, subscriber: Arc<dyn EventSubscriber>) {
        let mut state = self.state.write().await;
        state
            .subscribers
            .entry(routing_key.into())
            .or_default()
            .push(subscriber);
    }

    /// Returns every event published so far.
    pub async fn published(&self) -> Vec<PublishedEvent> {
        self.state.read().await.published.clone()
    }

    /// Returns the envelopes published under one routing key.
    pub async fn published_for(&self, routing_key: &str) -> Vec<EventEnvelope> {
        self.state
            .read()
            .await
            .published
            .iter()
            .filter(|p| p.routing_key == routing_key)
            .map(|p| p.envelope.clone())
            .collect()
    }

    /// Returns how many events were published under one routing key.
    pub async fn published_count(&self, routing_key: &str) -> usize {
        self.published_for(routing_key).await.len()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: EventEnvelope,
    ) -> Result<(), EventBusError> {
        let subscribers: Vec<Arc<dyn EventSubscriber>> = {
            let mut state = self.state.write().await;
            state.published.push(PublishedEvent {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                envelope: envelope.clone(),
            });
            state
                .subscribers
                .get(routing_key)
                .cloned()
                .unwrap_or_default()
        };

        for subscriber in subscribers {
            if let Err(e) = subscriber.handle(&envelope).await {
                // Subscriber failures are isolated; delivery continues.
                tracing::error!(
                    subscriber = subscriber.name(),
                    routing_key,
                    event_id = %envelope.event_id,
                    error = %e,
                    "event subscriber failed"
                );
            }
        }

        Ok(())
    }
}
