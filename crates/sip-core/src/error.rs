//! Error types for SIP message decoding

use thiserror::Error;

/// Result type for sip-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding an inbound datagram.
///
/// Missing headers and URIs are not errors: lookups return empty or absent
/// values instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The datagram is not valid UTF-8 text
    #[error("Datagram is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}
