//! Response synthesis for accepted and rejected INVITEs.
//!
//! Responses echo Via, Record-Route, From, To, Call-ID and CSeq verbatim from
//! the request. An acceptance with media carries an SDP answer; everything
//! else is header-only with `Content-Length: 0`.

use std::fmt;

use tracing::debug;

use crate::context::CallContext;
use crate::sdp::{MediaSession, build_sdp_answer};

/// Line terminator of the SIP wire format
pub const CRLF: &str = "\r\n";

/// User part of the Contact URI advertised in responses
pub const CONTACT_USER: &str = "sipfront";

/// A SIP status code and its reason phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    pub code: u16,
    pub reason: &'static str,
}

impl StatusLine {
    pub const OK: StatusLine = StatusLine { code: 200, reason: "OK" };
    pub const NOT_FOUND: StatusLine = StatusLine { code: 404, reason: "Not Found" };
    pub const SERVICE_UNAVAILABLE: StatusLine = StatusLine { code: 503, reason: "Service Unavailable" };
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0 {} {}", self.code, self.reason)
    }
}

/// Builder for a response to the request described by a [`CallContext`]
pub struct ResponseBuilder<'a> {
    status: StatusLine,
    context: &'a CallContext,
    media: Option<&'a MediaSession>,
    public_addr: Option<&'a str>,
    contact: Option<&'a str>,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(status: StatusLine, context: &'a CallContext) -> Self {
        Self {
            status,
            context,
            media: None,
            public_addr: None,
            contact: None,
        }
    }

    /// Attach an SDP answer for `media`, advertising `public_addr` if set
    pub fn with_media(mut self, media: &'a MediaSession, public_addr: Option<&'a str>) -> Self {
        self.media = Some(media);
        self.public_addr = public_addr;
        self
    }

    /// Add `Contact: <sip:sipfront@{addr}>`, where `addr` is `host:port`
    pub fn with_contact(mut self, addr: &'a str) -> Self {
        self.contact = Some(addr);
        self
    }

    pub fn build(self) -> String {
        let ctx = self.context;
        let body = self
            .media
            .map(|media| build_sdp_answer(media, self.public_addr))
            .unwrap_or_default();

        let mut lines: Vec<String> = Vec::with_capacity(ctx.via.len() + ctx.record_route.len() + 9);
        lines.push(self.status.to_string());
        if ctx.via.is_empty() {
            lines.push("Via: ".to_string());
        }
        for via in &ctx.via {
            lines.push(format!("Via: {}", via));
        }
        for route in &ctx.record_route {
            lines.push(format!("Record-Route: {}", route));
        }
        lines.push(format!("From: {}", ctx.from));
        lines.push(format!("To: {}", ctx.to));
        lines.push(format!("Call-ID: {}", ctx.call_id));
        lines.push(format!("CSeq: {}", ctx.cseq));
        if let Some(addr) = self.contact {
            lines.push(format!("Contact: <sip:{}@{}>", CONTACT_USER, addr));
        }
        if self.media.is_some() {
            lines.push("Content-Type: application/sdp".to_string());
        }
        lines.push(format!("Content-Length: {}", body.len()));

        let mut response = lines.join(CRLF);
        response.push_str(CRLF);
        response.push_str(CRLF);
        response.push_str(&body);

        debug!(
            status = self.status.code,
            call_id = %ctx.call_id,
            bytes = response.len(),
            "Synthesized SIP response"
        );
        response
    }
}

/// Build the `200 OK` for an accepted call.
///
/// Carries an SDP answer when the context holds a media session, and a
/// Contact header when `contact` (`host:port`) is given.
pub fn synthesize_response(
    context: &CallContext,
    public_addr: Option<&str>,
    contact: Option<&str>,
) -> String {
    let mut builder = ResponseBuilder::new(StatusLine::OK, context);
    if let Some(media) = context.media.as_ref() {
        builder = builder.with_media(media, public_addr);
    }
    if let Some(addr) = contact {
        builder = builder.with_contact(addr);
    }
    builder.build()
}
