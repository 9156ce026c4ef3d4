//! SIP message handling for the sipfront signaling front-end
//!
//! This crate decodes inbound request datagrams into a header lookup, extracts
//! the caller and destination principals, and synthesizes the responses sent
//! back to the caller, including the SDP answer for an accepted call.

pub mod error;
pub mod message;
pub mod uri;
pub mod sdp;
pub mod context;
pub mod response;

pub use error::{Error, Result};
pub use message::{HeaderMap, InboundMessage, Method, extract_header};
pub use uri::extract_principal;
pub use sdp::{Codec, MediaSession, SUPPORTED_CODECS, build_sdp_answer, extract_sdp_connection};
pub use context::CallContext;
pub use response::{ResponseBuilder, StatusLine, synthesize_response};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        CallContext, Error, InboundMessage, MediaSession, Method, ResponseBuilder, Result,
        StatusLine, extract_header, extract_principal, synthesize_response,
    };
}
