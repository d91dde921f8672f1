//! The event envelope carried on every bus topic.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlcheck_core::types::{CorrelationId, EventId, Timestamp};
use uuid::Uuid;

/// Wire shape for all published events.
///
/// The payload stays a raw JSON value so bus backends never need to
/// know the message types; [`Envelope::encode`] / [`Envelope::decode`]
/// do the typed conversion at the edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event_id: EventId,

    /// Dot-separated event name, e.g. `"task.requested"`.
    pub event_type: String,

    /// When the event was created (UTC).
    pub timestamp: Timestamp,

    /// Ties every event of one submission together for tracing.
    pub correlation_id: CorrelationId,

    pub payload: serde_json::Value,
}

impl Envelope {
    /// Wrap a typed payload in a fresh envelope.
    pub fn encode<T: Serialize>(
        event_type: &str,
        correlation_id: CorrelationId,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            correlation_id,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Deserialize the payload into a typed message.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
