//! Durable event publication
//!
//! The broker connection is established in the background by a
//! [`ConnectionManager`] and handed to publishers through a [`ChannelSlot`].
//! Publishing never blocks call handling: while no channel is available an
//! event is dropped with a warning.

pub mod amqp;
pub mod connection;
pub mod publisher;
pub mod slot;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use amqp::{AmqpChannel, AmqpConnector};
pub use connection::{ConnectOutcome, ConnectionManager, ReconnectPolicy};
pub use publisher::{EventPublisher, PublishOutcome};
pub use slot::ChannelSlot;

/// Errors raised while connecting to or publishing on the broker
#[derive(Debug, Error)]
pub enum EventError {
    /// AMQP protocol or connection error
    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),

    /// The event could not be encoded as JSON
    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker did not complete the handshake in time
    #[error("Broker connection timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// The broker negatively acknowledged a publish
    #[error("Broker rejected message for exchange '{exchange}' with routing key '{routing_key}'")]
    Rejected { exchange: String, routing_key: String },

    /// Any other channel failure
    #[error("Event channel error: {0}")]
    Channel(String),
}

/// An event that can be published on the broker
pub trait BrokerEvent: Serialize + Send + Sync {
    /// Event type name, e.g. `call.started`
    fn event_type(&self) -> &str;

    /// Routing key used when publishing; the event type by default
    fn routing_key(&self) -> &str {
        self.event_type()
    }
}

/// An open channel able to publish serialized events
#[async_trait]
pub trait EventChannel: Send + Sync + std::fmt::Debug {
    /// Publish `payload` on `exchange` with `routing_key` and wait for the
    /// broker to accept it
    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<(), EventError>;
}

/// Establishes broker channels for the [`ConnectionManager`]
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open a connection and a channel ready for publishing
    async fn connect(&self) -> Result<Arc<dyn EventChannel>, EventError>;

    /// Address used in log lines; must not contain credentials
    fn describe(&self) -> String;
}
