//! SDP answer generation and offer inspection
//!
//! The answer always offers the same fixed codec set on a single audio stream.

use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use nom::{
    IResult,
    bytes::complete::{tag, take_till1},
    character::complete::{digit1, space1},
    sequence::{preceded, terminated},
};
use serde::Serialize;

/// An RTP payload format offered in the SDP answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Codec {
    pub payload_type: u8,
    pub name: &'static str,
    pub clock_rate: u32,
}

/// G.711 mu-law
pub const PCMU: Codec = Codec { payload_type: 0, name: "PCMU", clock_rate: 8000 };
/// G.711 A-law
pub const PCMA: Codec = Codec { payload_type: 8, name: "PCMA", clock_rate: 8000 };
/// RFC 4733 DTMF events
pub const TELEPHONE_EVENT: Codec = Codec { payload_type: 101, name: "telephone-event", clock_rate: 8000 };

/// Codec set carried by every media session, in preference order
pub const SUPPORTED_CODECS: [Codec; 3] = [PCMU, PCMA, TELEPHONE_EVENT];

/// A reserved media transport endpoint for one accepted call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSession {
    pub host: String,
    pub port: u16,
    pub codecs: Vec<Codec>,
}

impl MediaSession {
    /// Create a session on the allocated endpoint with the fixed codec set
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            codecs: SUPPORTED_CODECS.to_vec(),
        }
    }
}

/// Build the SDP answer body for `media`.
///
/// `public_addr` replaces the allocated host in the origin and connection
/// lines when set, so peers behind NAT get a reachable address.
pub fn build_sdp_answer(media: &MediaSession, public_addr: Option<&str>) -> String {
    let addr = public_addr
        .filter(|a| !a.is_empty())
        .unwrap_or(media.host.as_str());
    let session_id = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let payload_types = media
        .codecs
        .iter()
        .map(|c| c.payload_type.to_string())
        .collect::<Vec<_>>()
        .join(" ");

    let mut sdp = String::new();
    // Writing to a String cannot fail
    let _ = write!(sdp, "v=0\r\n");
    let _ = write!(sdp, "o=- {0} {0} IN IP4 {1}\r\n", session_id, addr);
    let _ = write!(sdp, "s=sipfront\r\n");
    let _ = write!(sdp, "c=IN IP4 {}\r\n", addr);
    let _ = write!(sdp, "t=0 0\r\n");
    let _ = write!(sdp, "m=audio {} RTP/AVP {}\r\n", media.port, payload_types);
    for codec in &media.codecs {
        let _ = write!(sdp, "a=rtpmap:{} {}/{}\r\n", codec.payload_type, codec.name, codec.clock_rate);
    }
    let _ = write!(sdp, "a=sendrecv\r\n");
    sdp
}

/// Parse `c=IN IP4 <addr>`
fn connection_line(input: &str) -> IResult<&str, &str> {
    preceded(
        terminated(tag("c=IN"), space1),
        preceded(terminated(tag("IP4"), space1), take_till1(|c: char| c.is_whitespace())),
    )(input)
}

/// Parse `m=audio <port> ...`
fn audio_media_line(input: &str) -> IResult<&str, &str> {
    preceded(terminated(tag("m=audio"), space1), digit1)(input)
}

/// Caller's offered RTP address as `addr:port`, taken from the first
/// connection line and the first audio media line of an SDP offer.
pub fn extract_sdp_connection(body: &str) -> Option<String> {
    let mut addr = None;
    let mut port = None;

    for line in body.lines() {
        let line = line.trim();
        if addr.is_none() {
            if let Ok((_, a)) = connection_line(line) {
                addr = Some(a);
            }
        }
        if port.is_none() {
            if let Ok((_, p)) = audio_media_line(line) {
                port = Some(p);
            }
        }
    }

    match (addr, port) {
        (Some(a), Some(p)) => Some(format!("{}:{}", a, p)),
        _ => None,
    }
}
