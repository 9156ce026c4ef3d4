use std::net::SocketAddr;

use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the transport layer
#[derive(Debug, Error)]
pub enum Error {
    /// Binding the listening socket failed; fatal for the listener
    #[error("Failed to bind UDP socket to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Sending a datagram failed
    #[error("Failed to send {len} bytes to {destination}: {source}")]
    SendFailed {
        destination: SocketAddr,
        len: usize,
        #[source]
        source: std::io::Error,
    },

    /// The datagram was only partially written
    #[error("Short send to {destination}: wrote {written} of {len} bytes")]
    ShortSend {
        destination: SocketAddr,
        written: usize,
        len: usize,
    },

    /// The transport has been closed
    #[error("Transport is closed")]
    TransportClosed,

    /// Any other socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
