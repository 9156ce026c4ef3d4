//! Connectionless transport for the sipfront signaling front-end
//!
//! The UDP transport owns the listening socket, forwards every received
//! datagram as a [`TransportEvent`], and lets any number of concurrent tasks
//! send responses on the same socket.

pub mod error;
pub mod transport;

pub use error::{Error, Result};
pub use transport::udp::UdpTransport;
pub use transport::{Transport, TransportEvent};

/// Bind a UDP transport to the specified address
pub async fn bind_udp(
    addr: std::net::SocketAddr,
) -> Result<(UdpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    UdpTransport::bind(addr, None).await
}
