//! # sipfront call engine
//!
//! Accepts SIP INVITEs over UDP, validates the caller and destination against
//! external services, reserves a media session, answers with `200 OK` and an
//! SDP body, and announces the accepted call on a durable message broker.
//!
//! ```text
//! datagram -> UdpTransport -> CallPipeline -> 200 OK -> EventPublisher -> broker
//!                                  |
//!                   directory / dialplan / media services
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use sipfront_call_engine::{CallServices, SignalingConfig, SignalingServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SignalingConfig::from_env()?;
//! let services = CallServices::http(&config)?;
//!
//! let mut server = SignalingServer::new(config, services);
//! server.start().await?;
//! println!("listening on {}", server.local_addr()?);
//!
//! tokio::signal::ctrl_c().await?;
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod server;
pub mod services;

pub use config::SignalingConfig;
pub use error::{Error, Result};
pub use events::{CALL_STARTED, CallEvent};
pub use pipeline::{CallPipeline, CallState, EventDelivery, PipelineOutcome, PipelineSettings, RejectReason};
pub use server::SignalingServer;
pub use services::{
    AllocatedMedia, AllocationError, CallServices, DialplanResolver, LookupError, MediaAllocator,
    UserDirectory,
};

pub mod prelude {
    pub use crate::config::SignalingConfig;
    pub use crate::pipeline::{CallPipeline, PipelineOutcome, RejectReason};
    pub use crate::server::SignalingServer;
    pub use crate::services::CallServices;
}
