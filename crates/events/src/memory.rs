//! In-process event bus backed by `tokio::sync::broadcast` channels,
//! one per topic.
//!
//! Delivery is fan-out to the subscribers alive at publish time; with
//! no subscribers an event is silently dropped. There is no redelivery,
//! so acknowledgements are no-ops. Suitable for the embedded service
//! and tests; the durable backend lives in `sqlcheck-db`.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;

use crate::bus::{BusError, Delivery, EventBus, Subscription, Topic};
use crate::envelope::Envelope;

/// Default buffer capacity per topic channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Single-process fan-out bus.
pub struct InProcessBus {
    channels: HashMap<Topic, broadcast::Sender<Envelope>>,
}

impl InProcessBus {
    /// Create a bus with a specific per-topic channel capacity.
    ///
    /// When a buffer fills, the oldest un-consumed events are dropped
    /// and slow receivers observe a lag which is logged and skipped.
    pub fn new(capacity: usize) -> Self {
        let channels = Topic::ALL
            .into_iter()
            .map(|topic| {
                let (sender, _) = broadcast::channel(capacity);
                (topic, sender)
            })
            .collect();
        Self { channels }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<Envelope> {
        // Every topic is inserted in `new`.
        &self.channels[&topic]
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl EventBus for InProcessBus {
    async fn publish(&self, topic: Topic, envelope: Envelope) -> Result<(), BusError> {
        // A SendError only means there are zero receivers right now.
        let _ = self.sender(topic).send(envelope);
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<Subscription, BusError> {
        let receiver = self.sender(topic).subscribe();
        let stream = futures::stream::unfold(receiver, move |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => return Some((Delivery::unacked(envelope), receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(topic = %topic, skipped, "Subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
