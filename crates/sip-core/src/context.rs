//! Per-call working state threaded through one pipeline run

use std::net::SocketAddr;

use crate::message::InboundMessage;
use crate::sdp::{MediaSession, extract_sdp_connection};
use crate::uri::extract_principal;

/// Fields of an INVITE that the pipeline and response synthesis need.
///
/// Echoed header values are copied verbatim from the request. A missing header
/// shows up as an empty string and a missing SIP URI as `None`.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub call_id: String,
    pub from_principal: Option<String>,
    pub to_principal: Option<String>,
    /// Every Via value of the request, in order
    pub via: Vec<String>,
    /// Every Record-Route value of the request, in order
    pub record_route: Vec<String>,
    pub from: String,
    pub to: String,
    pub cseq: String,
    pub remote_addr: SocketAddr,
    /// Caller's offered RTP address from the request SDP, if any
    pub caller_rtp_addr: Option<String>,
    pub trace_id: String,
    /// Set once media allocation succeeds
    pub media: Option<MediaSession>,
}

impl CallContext {
    pub fn from_message(message: &InboundMessage, trace_id: impl Into<String>) -> Self {
        let from = message.header("From").to_string();
        let to = message.header("To").to_string();

        Self {
            call_id: message.header("Call-ID").to_string(),
            from_principal: extract_principal(&from),
            to_principal: extract_principal(&to),
            via: message.header_values("Via").to_vec(),
            record_route: message.header_values("Record-Route").to_vec(),
            from,
            to,
            cseq: message.header("CSeq").to_string(),
            remote_addr: message.source(),
            caller_rtp_addr: extract_sdp_connection(message.body()),
            trace_id: trace_id.into(),
            media: None,
        }
    }

    /// Lookup key for the identity directory; empty when no SIP URI was found
    pub fn caller_key(&self) -> &str {
        self.from_principal.as_deref().unwrap_or("")
    }

    /// Lookup key for the routing resolver; empty when no SIP URI was found
    pub fn destination_key(&self) -> &str {
        self.to_principal.as_deref().unwrap_or("")
    }
}
