//! Transport abstraction shared by the listener and the call pipeline

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::Result;

pub mod udp;

/// Events emitted by a transport's receive loop
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A datagram arrived
    DatagramReceived {
        /// Raw datagram payload
        payload: Bytes,
        /// Sender address
        source: SocketAddr,
        /// Local address it arrived on
        destination: SocketAddr,
    },

    /// A receive error that did not stop the loop
    Error {
        error: String,
    },

    /// The receive loop has exited
    Closed,
}

/// A connectionless transport that can be shared across concurrent pipeline
/// runs. Sends may be issued concurrently from any number of tasks.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Local address the transport is bound to
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Send one datagram to `destination`
    async fn send_to(&self, payload: &[u8], destination: SocketAddr) -> Result<()>;

    /// Stop the receive loop and refuse further sends
    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}
