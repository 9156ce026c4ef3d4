use tracing::{debug, warn};

use super::{BrokerEvent, ChannelSlot, EventError};

/// Result of a publish request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The broker accepted the event
    Published,
    /// No channel was established; the event was discarded
    Dropped,
}

/// Publishes events on the configured exchange through the shared slot
#[derive(Debug, Clone)]
pub struct EventPublisher {
    slot: ChannelSlot,
    exchange: String,
}

impl EventPublisher {
    pub fn new(slot: ChannelSlot, exchange: impl Into<String>) -> Self {
        Self {
            slot,
            exchange: exchange.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn is_connected(&self) -> bool {
        self.slot.is_established()
    }

    /// Serialize `event` as JSON and publish it with its routing key.
    ///
    /// Events are not buffered: without an established channel the event is
    /// dropped and [`PublishOutcome::Dropped`] returned.
    pub async fn publish<E: BrokerEvent>(&self, event: &E) -> Result<PublishOutcome, EventError> {
        let Some(channel) = self.slot.get() else {
            warn!(
                event_type = event.event_type(),
                "Broker channel not established, dropping event"
            );
            return Ok(PublishOutcome::Dropped);
        };

        let payload = serde_json::to_vec(event)?;
        channel
            .publish(&self.exchange, event.routing_key(), &payload)
            .await?;

        debug!(
            exchange = %self.exchange,
            routing_key = event.routing_key(),
            bytes = payload.len(),
            "Published event"
        );
        Ok(PublishOutcome::Published)
    }
}
