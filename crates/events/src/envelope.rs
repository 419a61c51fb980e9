use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A domain event as it travels over the bus.
///
/// Immutable once built. The payload is pre-serialized JSON so the bus
/// never needs to know concrete payload types; the envelope carries the
/// metadata consumers need for tracing and idempotent handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier of this event instance.
    pub event_id: Uuid,

    /// Type tag used for routing and dispatch.
    pub event_type: String,

    /// ID of the aggregate that produced the event.
    pub aggregate_id: Uuid,

    /// Correlation ID linking events of one unit of work.
    pub correlation_id: Uuid,

    /// Component that produced the event.
    pub source: String,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,

    /// Type-specific event data.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Builds an envelope around a serializable payload.
    pub fn new<P: Serialize>(
        event_type: impl Into<String>,
        aggregate_id: Uuid,
        correlation_id: Uuid,
        source: impl Into<String>,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            aggregate_id,
            correlation_id,
            source: source.into(),
            timestamp: Utc::now(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Deserializes the payload into a concrete type.
    pub fn payload_as<P: for<'de> Deserialize<'de>>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
