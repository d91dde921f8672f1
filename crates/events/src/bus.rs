//! The event bus capability.
//!
//! Backends provide at-least-once delivery at best; consumers must be
//! idempotent. A [`Delivery`] is acknowledged once the consumer has
//! either fully processed the event or deliberately dropped it; an
//! unacknowledged delivery is eligible for redelivery on backends that
//! support it.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// The three topics of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Dispatcher -> workers: per-task execution requests.
    Requests,
    /// Workers -> aggregator: terminal task outcomes.
    Completions,
    /// Aggregator -> external submitter: aggregated batch summaries.
    BatchResults,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Requests, Topic::Completions, Topic::BatchResults];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Requests => "requests",
            Topic::Completions => "completions",
            Topic::BatchResults => "batch_results",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requests" => Ok(Topic::Requests),
            "completions" => Ok(Topic::Completions),
            "batch_results" => Ok(Topic::BatchResults),
            other => Err(BusError::Backend(format!("unknown topic: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Event codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Bus backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

/// Backend hook invoked when a delivery is acknowledged.
#[async_trait]
pub trait Acker: Send {
    async fn ack(self: Box<Self>) -> Result<(), BusError>;
}

/// One received event plus its acknowledgement handle.
pub struct Delivery {
    pub envelope: Envelope,
    acker: Option<Box<dyn Acker>>,
}

impl Delivery {
    /// A delivery with no acknowledgement semantics (fan-out backends).
    pub fn unacked(envelope: Envelope) -> Self {
        Self {
            envelope,
            acker: None,
        }
    }

    pub fn with_acker(envelope: Envelope, acker: Box<dyn Acker>) -> Self {
        Self {
            envelope,
            acker: Some(acker),
        }
    }

    /// Mark the delivery consumed. Dropping a `Delivery` without acking
    /// leaves it eligible for redelivery on durable backends.
    pub async fn ack(mut self) -> Result<(), BusError> {
        match self.acker.take() {
            Some(acker) => acker.ack().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("envelope", &self.envelope)
            .field("acked", &self.acker.is_none())
            .finish()
    }
}

/// An open subscription: an endless stream of deliveries for one topic.
pub type Subscription = BoxStream<'static, Delivery>;

// ---------------------------------------------------------------------------
// The capability
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: Topic, envelope: Envelope) -> Result<(), BusError>;

    async fn subscribe(&self, topic: Topic) -> Result<Subscription, BusError>;
}
