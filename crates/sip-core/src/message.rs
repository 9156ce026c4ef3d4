//! Line-oriented decoding of inbound SIP requests.
//!
//! Only the pieces the signaling pipeline needs are decoded: the method token
//! of the first line, the header section as a case-insensitive lookup, and the
//! raw body. Header values are kept verbatim (trimmed), nothing is validated.
//!
//! Header handling rules:
//!
//! - The header section ends at the first empty line. Nothing after it is
//!   scanned, so a body line that looks like `Via: ...` is never a header.
//! - Names are matched case-insensitively and compact forms (`v`, `f`, `t`,
//!   `i`, `m`, `l`, `c`) are indexed under their full names.
//! - A line starting with a space or tab continues the previous header value
//!   and is joined with a single space.
//! - Repeated headers keep every value in arrival order; [`InboundMessage::header`]
//!   returns the first one.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use crate::error::Result;

/// The only request method the signaling pipeline processes
pub const INVITE: &str = "INVITE";

/// Request method token taken from the first line of a datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Invite,
    /// Any other token, including status lines (`SIP/2.0`) and empty input
    Other(String),
}

impl Method {
    fn from_token(token: &str) -> Self {
        if token == INVITE {
            Method::Invite
        } else {
            Method::Other(token.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => INVITE,
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header lookup keyed by lowercased full header name
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: HashMap<String, Vec<String>>,
}

impl HeaderMap {
    /// Build the lookup from the header section (everything after the first line)
    fn from_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Self {
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();
        let mut last_key: Option<String> = None;

        for line in lines {
            if line.starts_with(' ') || line.starts_with('\t') {
                // Folded continuation of the previous header
                if let Some(key) = &last_key {
                    if let Some(value) = entries.get_mut(key).and_then(|values| values.last_mut()) {
                        let continuation = line.trim();
                        if !continuation.is_empty() {
                            if !value.is_empty() {
                                value.push(' ');
                            }
                            value.push_str(continuation);
                        }
                    }
                }
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                last_key = None;
                continue;
            };

            let key = canonical_name(name.trim());
            entries.entry(key.clone()).or_default().push(value.trim().to_string());
            last_key = Some(key);
        }

        Self { entries }
    }

    /// First value of the named header, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&canonical_name(name))
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value of the named header in arrival order
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&canonical_name(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&canonical_name(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lowercase a header name and expand RFC 3261 compact forms
fn canonical_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    let full = match lower.as_str() {
        "v" => "via",
        "f" => "from",
        "t" => "to",
        "i" => "call-id",
        "m" => "contact",
        "l" => "content-length",
        "c" => "content-type",
        _ => return lower,
    };
    full.to_string()
}

/// A decoded inbound datagram, scoped to one pipeline run
#[derive(Debug, Clone)]
pub struct InboundMessage {
    raw: String,
    source: SocketAddr,
    method: Method,
    headers: HeaderMap,
    body_offset: Option<usize>,
}

impl InboundMessage {
    /// Decode raw datagram bytes received from `source`.
    ///
    /// Fails only when the bytes are not UTF-8.
    pub fn decode(bytes: &[u8], source: SocketAddr) -> Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        Ok(Self::from_text(text, source))
    }

    /// Decode an already-textual message
    pub fn from_text(text: &str, source: SocketAddr) -> Self {
        let raw = text.to_string();
        let (head, body_offset) = split_head(&raw);

        let mut lines = head.lines();
        let method = lines
            .next()
            .and_then(|first| first.split_whitespace().next())
            .map(Method::from_token)
            .unwrap_or_else(|| Method::Other(String::new()));
        let headers = HeaderMap::from_lines(lines);

        Self {
            raw,
            source,
            method,
            headers,
            body_offset,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_invite(&self) -> bool {
        self.method == Method::Invite
    }

    pub fn source(&self) -> SocketAddr {
        self.source
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of the named header, or `""` when absent
    pub fn header(&self, name: &str) -> &str {
        self.headers.get(name).unwrap_or("")
    }

    /// Every value of the named header in arrival order
    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers.get_all(name)
    }

    /// Message body; empty when there is no blank line separator
    pub fn body(&self) -> &str {
        match self.body_offset {
            Some(offset) => &self.raw[offset..],
            None => "",
        }
    }
}

/// Split the raw text at the first empty line.
///
/// Returns the header part and the byte offset where the body starts.
fn split_head(raw: &str) -> (&str, Option<usize>) {
    let crlf = raw.find("\r\n\r\n").map(|i| (i, i + 4));
    let lf = raw.find("\n\n").map(|i| (i, i + 2));

    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    match split {
        Some((end, body_start)) => (&raw[..end], Some(body_start)),
        None => (raw, None),
    }
}

/// Value of the first header line named `name`, matched case-insensitively
/// and trimmed. Returns `""` when the header is absent.
pub fn extract_header<'a>(message: &'a InboundMessage, name: &str) -> &'a str {
    message.header(name)
}
