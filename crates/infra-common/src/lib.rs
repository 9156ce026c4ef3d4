//! Shared infrastructure for the sipfront signaling front-end
//!
//! - [`logging`]: global `tracing` subscriber setup
//! - [`events`]: durable event publication over a message broker, with a
//!   background connection manager

pub mod errors;
pub mod events;
pub mod logging;

pub use errors::{Error, Result};
pub use events::{
    AmqpConnector, BrokerConnector, BrokerEvent, ChannelSlot, ConnectOutcome, ConnectionManager,
    EventChannel, EventError, EventPublisher, PublishOutcome, ReconnectPolicy,
};
pub use logging::{LogFormat, LoggingConfig, setup_logging};
